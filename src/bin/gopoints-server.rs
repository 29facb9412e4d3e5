use gopoints::ServerConfig;

#[tokio::main]
async fn main() {
    gopoints::init_tracing(gopoints::log_level_from_env());

    let config = ServerConfig::new();
    tracing::info!("GO-POINTS server is listening on {} ...", config.addr());
    let res = match gopoints::server(&config).await {
        Ok(server) => server.run().await.map_err(|err| format!("failed to serve: {}", err)),
        Err(err) => Err(format!("failed to listen: {}", err)),
    };
    if let Err(err) = res {
        tracing::error!("{}", err);
        std::process::exit(1);
    }
}
