use anyhow::Result;
use std::rc::Rc;
use tracing_subscriber::EnvFilter;

use worldmap::ai::AiLogic;
use worldmap::config::load_config;
use worldmap::delta::synonyms;
use worldmap::game_loop::GameLoop;
use worldmap::kobold_api::KoboldClient;
use worldmap::state::GameState;

#[tokio::main(flavor = "current_thread")]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("worldmap=info")))
        .with_writer(std::io::stderr)
        .init();

    let config = load_config()?;
    println!("Kobold API: {}", config.connection.kobold_endpoint);
    println!("Secondary API: {}", config.connection.secondary_endpoint());
    println!();

    synonyms::init();

    let timeout = config.pipeline.backend_timeout();
    let streaming = config.connection.streaming;
    let primary = Rc::new(KoboldClient::new(&config.connection.kobold_endpoint, timeout, streaming)?);
    let secondary = Rc::new(KoboldClient::new(config.connection.secondary_endpoint(), timeout, streaming)?);

    let logic = Rc::new(AiLogic::new(primary, secondary, config.pipeline.clone()));
    let mut state = GameState::new(logic, &config.game.start_prompt);

    let report = state.start().await;
    GameLoop::display_report(&report);

    let mut game_loop = GameLoop::new(state);
    game_loop.run_loop().await?;

    Ok(())
}
