use paladin::config::BotConfig;
use paladin::platform::SerenityPlatform;
use paladin::store::YamlFileStore;
use paladin::{BOT_NAME, Data, Error, commands, handlers, logging};
use poise::serenity_prelude::{self as serenity};
use serenity::GatewayIntents;
use std::sync::Arc;
use tracing::{error, info};

/// Messages kept per channel so edits can be logged with their original text
const CACHED_MESSAGES_PER_CHANNEL: usize = 200;

/// Main function to run the bot
async fn async_main() -> Result<(), Error> {
    let config = BotConfig::load()?;
    logging::init(&config.log_dir)?;
    info!(config = ?config, "Configuration loaded");
    let token = config.token()?.to_string();

    let store = YamlFileStore::open(&config.data_file).await?;
    info!(path = %store.path().display(), "Store opened");

    let http = Arc::new(serenity::Http::new(&token));
    let bot_user = http.get_current_user().await?;
    let platform = SerenityPlatform::new(Arc::clone(&http), bot_user.id.get());
    let data = Data::new(config.clone(), Arc::new(store), Arc::new(platform));

    let framework_data = data.clone();
    let register_globally = config.register_globally;
    let framework = poise::Framework::builder()
        .options(poise::FrameworkOptions {
            commands: commands::all(),
            pre_command: |ctx| {
                Box::pin(async move {
                    logging::log_command_start(ctx);
                })
            },
            post_command: |ctx| {
                Box::pin(async move {
                    logging::log_command_end(ctx);
                })
            },
            on_error: |error| Box::pin(logging::on_error(error)),
            ..Default::default()
        })
        .setup(move |ctx, _ready, framework| {
            Box::pin(async move {
                if register_globally {
                    logging::log_console("Registering commands globally");
                    poise::builtins::register_globally(ctx, &framework.options().commands).await?;
                } else {
                    logging::log_console("Skipping global command registration");
                }
                Ok(framework_data)
            })
        })
        .build();

    let intents = GatewayIntents::non_privileged()
        | GatewayIntents::MESSAGE_CONTENT
        | GatewayIntents::GUILD_MEMBERS;
    let mut cache_settings = ::serenity::cache::Settings::default();
    cache_settings.max_messages = CACHED_MESSAGES_PER_CHANNEL;
    let mut client = serenity::ClientBuilder::new(&token, intents)
        .cache_settings(cache_settings)
        .event_handler(handlers::Handler::new(data.clone()))
        .framework(framework)
        .await?;

    let shard_manager = Arc::clone(&client.shard_manager);
    tokio::spawn(async move {
        if let Err(e) = tokio::signal::ctrl_c().await {
            error!("Failed to listen for shutdown signal: {e}");
            return;
        }
        info!("Shutting down {BOT_NAME}");
        data.shutdown().await;
        shard_manager.shutdown_all().await;
    });

    info!("Starting bot...");
    client.start().await?;
    Ok(())
}

fn main() {
    let runtime = match tokio::runtime::Builder::new_multi_thread().enable_all().build() {
        Ok(runtime) => runtime,
        Err(err) => {
            eprintln!("Failed to start runtime: {err}");
            std::process::exit(1);
        }
    };

    if let Err(err) = runtime.block_on(async_main()) {
        eprintln!("Error: {err}");
        std::process::exit(1);
    }
}
