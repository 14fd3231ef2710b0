use fronius_bridge::prelude::*;

#[tokio::main]
async fn main() {
    let options = Options::new();

    if let Err(err) = fronius_bridge::app(options).await {
        // the logger may not be up yet if the config failed to load
        error!("{:#}", err);
        eprintln!("fronius-bridge: {:#}", err);
        std::process::exit(255);
    }
}
