/// Installs a panic hook that routes panic messages through `tracing` so they
/// end up in the same place as the rest of the process's logs.
pub fn install() {
    let default_hook = std::panic::take_hook();
    std::panic::set_hook(Box::new(move |info| {
        tracing::error!("thread panicked: {info}");
        default_hook(info);
    }));
}
