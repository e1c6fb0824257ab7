use certkeeper::core::provisioner::running_as_root;
use certkeeper::utils::{logger, validation::Validate};
use certkeeper::{ProvisionArgs, Provisioner, ShellRunner};
use clap::Parser;
use std::sync::Arc;
use std::time::Duration;

#[tokio::main]
async fn main() {
    let args = ProvisionArgs::parse();

    // 初始化日誌
    logger::init_cli_logger(args.verbose);

    if let Err(e) = args.validate() {
        tracing::error!("❌ Invalid arguments: {}", e);
        eprintln!("❌ {}", e);
        std::process::exit(2);
    }

    if running_as_root() == Some(false) {
        tracing::warn!("⚠️  This tool may require root privileges to modify proxy configuration.");
        tracing::warn!(
            "Consider running with: sudo certkeeper-provision --domain {} --port {}",
            args.domain,
            args.port
        );
    }

    let runner = Arc::new(ShellRunner::new(Duration::from_secs(
        args.command_timeout_secs,
    )));
    let provisioner = Provisioner::new(args.settings(), runner);

    match provisioner.run().await {
        Ok(report) => {
            tracing::info!("✅ Provisioning of {} completed", args.domain);
            println!("✅ {} -> localhost:{}", args.domain, args.port);
            println!("📁 Config: {}", report.config_path.display());
            if report.certificate_issued {
                println!("🔒 Certificate issued");
            }
        }
        Err(e) => {
            tracing::error!("❌ {} (Category: {:?})", e, e.source.category());
            eprintln!("❌ {}", e);
            std::process::exit(e.step.exit_code());
        }
    }
}
