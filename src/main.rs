use std::process::ExitCode;

use originserver::handlers::dynamic::DynamicRegistry;

fn main() -> ExitCode {
    // TZ=GMT stabilizes Date header formatting regardless of the operator's
    // environment; C locale is the process default and is never overridden.
    // SAFETY: called before any other thread exists.
    unsafe {
        std::env::set_var("TZ", "GMT");
    }

    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::try_from_default_env().unwrap_or_else(|_| "info".into()))
        .init();

    if let Err(err) = originserver::run(DynamicRegistry::new()) {
        eprintln!("originserver: {err}");
        return ExitCode::FAILURE;
    }
    ExitCode::SUCCESS
}
