#[tokio::main]
async fn main() {
    coordinator::run::start(std::env::args()).await;
}
