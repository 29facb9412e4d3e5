use gopoints::ClientConfig;

#[tokio::main]
async fn main() {
    gopoints::init_tracing(gopoints::log_level_from_env());

    let config = ClientConfig::from_args(std::env::args().skip(1));
    match gopoints::request_point(&config).await {
        Ok(point) => tracing::info!("GO-POINTS: {}", point),
        Err(err) => {
            // The connection has been dropped by now, exiting does not leak it.
            tracing::error!("could not receive point: {}", err);
            std::process::exit(1);
        }
    }
}
