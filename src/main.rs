use anyhow::Result;
use byte_relay::args::{Mode, Opt};
use byte_relay::{exec, proxy};
use structopt::StructOpt;
use tokio::sync::broadcast;
use tracing::*;

#[tokio::main(flavor = "current_thread")]
async fn main() -> Result<()> {
    let opt = Opt::from_args();
    // stdout may be a relay destination, so logs go to stderr
    let collector = tracing_subscriber::fmt()
        .with_max_level(opt.log_level)
        .with_writer(std::io::stderr)
        .finish();

    let _ = tracing::subscriber::set_global_default(collector);

    let config = opt.relay_config()?;
    let (shutdown_tx, shutdown) = broadcast::channel::<()>(1);
    tokio::spawn(async move {
        match tokio::signal::ctrl_c().await {
            Ok(()) => {
                info!("ctrl-c");
                let _ = shutdown_tx.send(());
            }
            Err(e) => {
                warn!("cannot listen for ctrl-c: {}", e);
                // keep the sender alive so receivers never see a close
                futures::future::pending::<()>().await;
            }
        }
    });

    match &opt.mode {
        Mode::Exec { command, args } => {
            let mut stop = shutdown;
            let code = exec::run(command, args, &config, async move {
                let _ = stop.recv().await;
            })
            .await?;
            std::process::exit(code);
        }
        Mode::Proxy { .. } => {
            let options = opt
                .mode
                .proxy_options()
                .ok_or_else(|| anyhow::anyhow!("not a proxy invocation"))?;
            proxy::serve(&options, &config, || {
                let mut stop = shutdown.resubscribe();
                async move {
                    let _ = stop.recv().await;
                }
            })
            .await?;
        }
    }
    Ok(())
}
