#[rocket::main]
async fn main() -> Result<(), rocket::Error> {
    tracing_subscriber::fmt()
        .with_env_filter(
            std::env::var("RUST_LOG").unwrap_or_else(|_| "roomboard=info".to_string()),
        )
        .init();

    let _rocket = roomboard::rocket().await.launch().await?;
    Ok(())
}
