//! Resolve a connection descriptor and optionally store it as a profile
//!
//! ```bash
//! cargo run --example resolve_descriptor -- "mysqlx://root@localhost/test?ssl-mode=None"
//! cargo run --example resolve_descriptor -- "server=db;user=app" --save app-db
//! RUST_LOG=xproto_connect=debug cargo run --example resolve_descriptor -- "mysqlx://u@[::1]"
//! ```
//!
//! Profiles are written to `$MYSQLX_SESSIONS_PATH` (default
//! `~/.mysqlx/sessions.json`).

use xproto_connect::{ConfigContext, ConnectionDescriptor, SessionConfigStore};

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .init();

    let mut args = std::env::args().skip(1);
    let Some(input) = args.next() else {
        eprintln!("usage: resolve_descriptor <uri-or-connection-string> [--save <name>]");
        std::process::exit(2);
    };

    let descriptor = match ConnectionDescriptor::parse(&input) {
        Ok(d) => d,
        Err(e) => {
            eprintln!("error ({}): {}", e.category(), e);
            std::process::exit(1);
        }
    };

    println!("canonical: {}", descriptor);
    println!("tls:       {}", descriptor.tls_mode());
    println!(
        "auth:      {} (requested {})",
        descriptor.auth_mode(),
        descriptor.requested_auth()
    );
    for (i, host) in descriptor.hosts_by_priority().iter().enumerate() {
        match host.priority {
            Some(p) => println!("host #{}:   {} (priority {})", i + 1, host, p),
            None => println!("host #{}:   {}", i + 1, host),
        }
    }
    if let Some(tls) = descriptor.to_tls_config()? {
        println!("rustls:    {:?}", tls);
    }

    if args.next().as_deref() == Some("--save") {
        let name = args.next().ok_or("--save requires a profile name")?;
        let store = SessionConfigStore::new(ConfigContext::from_env()?);
        let uri = descriptor.with_password("").to_uri();
        let config = store.save_uri(&name, &uri).await?;
        println!("saved profile '{}' -> {}", config.name, config.uri);
        println!("profiles:  {}", store.list().await?.join(", "));
    }

    Ok(())
}
