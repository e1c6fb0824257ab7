use anyhow::Context;
use certkeeper::utils::{logger, validation::Validate};
use certkeeper::config::DEFAULT_ENV_FILE;
use certkeeper::{
    CheckSchedule, Notifier, ShellRunner, SmtpMailer, Supervisor, SupervisorArgs,
    SupervisorConfig,
};
use clap::Parser;
use std::path::PathBuf;
use std::sync::Arc;

/// Exit code for configuration and schedule errors.
const EXIT_CONFIG: i32 = 2;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let args = SupervisorArgs::parse();

    // 載入並驗證配置
    let env_file = args
        .env_file
        .clone()
        .or_else(|| Some(PathBuf::from(DEFAULT_ENV_FILE)).filter(|path| path.is_file()));
    let loaded = match (&args.config, env_file) {
        (Some(path), _) => SupervisorConfig::from_file(path),
        (None, Some(path)) => SupervisorConfig::from_env_file(path),
        (None, None) => SupervisorConfig::from_env(),
    };
    let config = match loaded.and_then(|config| config.validate().map(|_| config)) {
        Ok(config) => config,
        Err(e) => {
            eprintln!("❌ Configuration error: {}", e);
            std::process::exit(EXIT_CONFIG);
        }
    };

    // 初始化日誌
    logger::init_supervisor_logger(&config.log_file, args.verbose)
        .with_context(|| format!("failed to open log file {}", config.log_file.display()))?;

    if args.verbose {
        tracing::debug!("Supervisor config: {:?}", config);
    }

    // 無法解析的排程代表服務永遠不會執行，直接結束
    let schedule = match CheckSchedule::parse(&config.check_schedule) {
        Ok(schedule) => schedule,
        Err(e) => {
            tracing::error!("{}", e);
            std::process::exit(EXIT_CONFIG);
        }
    };

    let notifier = if config.email.notifications_enabled {
        match SmtpMailer::from_config(&config.email) {
            Ok(mailer) => Notifier::new(Arc::new(mailer)),
            Err(e) => {
                tracing::error!("Email notifications are enabled but unusable: {}", e);
                std::process::exit(EXIT_CONFIG);
            }
        }
    } else {
        Notifier::disabled()
    };

    let runner = Arc::new(ShellRunner::new(config.command_timeout()));
    let supervisor =
        Arc::new(Supervisor::from_config(&config, runner, notifier).with_dry_run(args.dry_run));

    if args.once {
        tracing::info!("Running single certificate check");
        supervisor.run_pass().await;
        return Ok(());
    }

    supervisor
        .run(&schedule, async {
            if let Err(e) = tokio::signal::ctrl_c().await {
                tracing::error!("Failed to listen for shutdown signal: {}", e);
                std::future::pending::<()>().await;
            }
        })
        .await;

    Ok(())
}
