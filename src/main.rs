use std::process::ExitCode;

#[tokio::main]
async fn main() -> ExitCode {
    jobq::app::startup::run().await
}
