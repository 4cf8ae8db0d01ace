use std::fs;
use anyhow::{Result, anyhow};
use tracing_subscriber::EnvFilter;

use krishimitr::app::App;
use krishimitr::chat::ChatClient;
use krishimitr::config::Config;
use krishimitr::handler;
use krishimitr::tui::{self, AppEvent};
use krishimitr::ui;
use krishimitr::voice::{CommandSpeechEngine, SpeechEngine};
use krishimitr::weather::{ResolverStatus, WeatherResolver};

#[tokio::main]
async fn main() -> Result<()> {
    init_logging()?;

    let config = Config::load().unwrap_or_else(|e| {
        tracing::warn!("could not load config, using defaults: {e:#}");
        Config::default()
    });

    let chat = ChatClient::new(&config.backend_url());
    let speech: Option<Box<dyn SpeechEngine>> = config
        .speech_command()
        .map(|command| Box::new(CommandSpeechEngine::new(command)) as Box<dyn SpeechEngine>);

    let mut app = App::new(chat, speech);

    // The resolver runs exactly once per launch; the loop below picks up its
    // terminal state whenever it lands.
    let resolver = WeatherResolver::from_config(&config);
    let mut weather_task = Some(tokio::spawn(async move { resolver.resolve().await }));

    tui::install_panic_hook();
    let mut terminal = tui::init()?;
    let mut events = tui::EventHandler::new();

    while !app.should_quit {
        terminal.draw(|frame| ui::render(&mut app, frame))?;

        let Some(event) = events.next().await else {
            break;
        };

        match event {
            AppEvent::Tick => {
                app.tick_animation();
                app.poll_voice();
                app.settle_chat().await;

                if weather_task
                    .as_ref()
                    .is_some_and(|task| task.is_finished())
                {
                    if let Some(task) = weather_task.take() {
                        app.weather = task.await.unwrap_or_else(|e| {
                            ResolverStatus::Error(format!("Weather service error: {e}"))
                        });
                    }
                }
            }
            other => handler::handle_event(&mut app, other),
        }
    }

    tui::restore()?;
    Ok(())
}

fn init_logging() -> Result<()> {
    let log_dir = dirs::cache_dir()
        .ok_or_else(|| anyhow!("Could not determine cache directory"))?
        .join("krishimitr");
    fs::create_dir_all(&log_dir)?;
    let log_file = fs::File::create(log_dir.join("krishimitr.log"))?;

    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .with_writer(std::sync::Mutex::new(log_file))
        .with_ansi(false)
        .init();

    Ok(())
}
