use std::process::ExitCode;

#[tokio::main]
async fn main() -> ExitCode {
    let root = match std::env::current_dir() {
        Ok(dir) => dir,
        Err(e) => {
            eprintln!("Cannot determine working directory: {e}");
            return ExitCode::FAILURE;
        }
    };
    packsync_lib::run(&root).await
}
