use crate::{
    api,
    arguments::Arguments,
    engine::Coordinator,
    events::EventBus,
    settings::{self, Settings},
    storage::memory::InMemoryStorage,
};
use clap::Parser;
use observe::metrics::LivenessChecking;
use std::sync::Arc;
use tokio::task;

pub async fn start(args: impl Iterator<Item = String>) {
    let args = Arguments::parse_from(args);
    observe::tracing::initialize(args.log_filter.as_str(), args.log_stderr_threshold);
    tracing::info!("running trade coordinator with validated arguments:\n{}", args);
    observe::metrics::setup_registry(Some("trade_coordinator".into()), None);
    run(args).await;
}

struct Liveness;

#[async_trait::async_trait]
impl LivenessChecking for Liveness {
    async fn is_alive(&self) -> bool {
        true
    }
}

pub async fn run(args: Arguments) {
    let settings = Settings::from_file(&args.config).expect("failed to load chain settings");
    let contexts = settings::chain_contexts(&settings).expect("failed to build chain contexts");
    let chain_ids: Vec<u64> = contexts.iter().map(|context| context.chain_id).collect();
    tracing::info!(?chain_ids, "serving chains");

    let events = EventBus::new(chain_ids);
    let storage = Arc::new(InMemoryStorage::default());
    let coordinator = Arc::new(Coordinator::new(
        contexts,
        storage,
        events.clone(),
        args.selective_delay,
        args.approval_duration,
    ));

    let metrics_task = observe::metrics::serve_metrics(Arc::new(Liveness), args.metrics_address);

    let filter = api::handle_all_routes(coordinator, events);
    tracing::info!(address = %args.bind_address, "serving trade coordinator");
    let serve_task = task::spawn(warp::serve(filter).bind(args.bind_address));

    tokio::select! {
        result = metrics_task => panic!("metrics task exited {result:?}"),
        result = serve_task => panic!("api task exited {result:?}"),
    };
}
