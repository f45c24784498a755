//! Binary entrypoint for the tasker tool

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    tasker::cli::run().await
}
