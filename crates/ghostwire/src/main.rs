#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    lib_ghostwire::init().await?;
    // A pending stdin read parks a blocking thread that would keep the runtime alive.
    std::process::exit(0)
}
