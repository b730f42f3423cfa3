//! Panic reporting
//!
//! Release builds write a human-panic crash report; debug builds print a full
//! better-panic backtrace. Both log the panic before exiting.

use color_eyre::config::{HookBuilder, PanicHook};
use color_eyre::eyre::Result;

fn hooks() -> (PanicHook, color_eyre::config::EyreHook) {
    HookBuilder::default()
        .panic_section(format!(
            "This is a bug in {} {}. Please report it with the log file attached.",
            env!("CARGO_PKG_NAME"),
            env!("CARGO_PKG_VERSION")
        ))
        .capture_span_trace_by_default(false)
        .display_location_section(false)
        .display_env_section(false)
        .into_hooks()
}

pub fn initialize_panic_handler() -> Result<()> {
    let (panic_hook, eyre_hook) = hooks();
    eyre_hook.install()?;

    std::panic::set_hook(Box::new(move |panic_info| {
        let report = panic_hook.panic_report(panic_info).to_string();
        tracing::error!(
            location = panic_info.location().map(|l| l.to_string()),
            "panic: {}",
            strip_ansi_escapes::strip_str(&report)
        );

        #[cfg(not(debug_assertions))]
        {
            use human_panic::{handle_dump, print_msg, Metadata};
            let meta = Metadata::new(env!("CARGO_PKG_NAME"), env!("CARGO_PKG_VERSION"))
                .authors(env!("CARGO_PKG_AUTHORS").replace(':', ", "));

            let dump = handle_dump(&meta, panic_info);
            if let Err(e) = print_msg(dump, &meta) {
                eprintln!("human-panic: printing error message to console failed: {e}");
            }
            eprintln!("{report}");
        }

        #[cfg(debug_assertions)]
        {
            better_panic::Settings::auto()
                .most_recent_first(false)
                .lineno_suffix(true)
                .verbosity(better_panic::Verbosity::Full)
                .create_panic_handler()(panic_info);
        }

        std::process::exit(libc::EXIT_FAILURE);
    }));
    Ok(())
}
