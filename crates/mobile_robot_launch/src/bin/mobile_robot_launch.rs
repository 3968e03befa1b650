//! Mobile Robot Launch CLI
//!
//! Usage:
//!   mobile_robot_launch
//!   mobile_robot_launch -c launch/settings.yaml -a use_lidar:=true
//!   mobile_robot_launch --dry-run --format yaml
//!   mobile_robot_launch --emit-description > robot.urdf

use mobile_robot_launch::{
    Executor, ExecutorConfig, LaunchArgs, LaunchPlan, PlanBuilder, PlanFormat,
};
use tokio::sync::watch;

#[tokio::main]
async fn main() {
    let args: LaunchArgs = argh::from_env();

    // Initialize logging
    let log_level = match args.log_level.to_lowercase().as_str() {
        "error" => "error",
        "warn" => "warn",
        "info" => "info",
        "debug" => "debug",
        "trace" => "trace",
        _ => "info",
    };
    let env = env_logger::Env::default().default_filter_or(log_level);
    env_logger::init_from_env(env);

    let settings = match args.settings() {
        Ok(settings) => settings,
        Err(e) => {
            log::error!("Failed to load settings: {}", e);
            std::process::exit(1);
        }
    };

    let locator = args.locator();
    let builder = PlanBuilder::new(&settings, &locator);

    // Emit the expanded description only
    if args.emit_description {
        match builder
            .resolver()
            .resolve(&settings.package, &settings.model_file)
        {
            Ok(description) => println!("{}", description.as_str()),
            Err(e) => {
                log::error!("Failed to resolve robot description: {}", e);
                std::process::exit(1);
            }
        }
        return;
    }

    let plan = match builder.build() {
        Ok(plan) => plan,
        Err(e) => {
            log::error!("Failed to build launch plan: {}", e);
            std::process::exit(1);
        }
    };

    log::info!(
        "Robot '{}': {} links, {} joints, {} plugins, {} sensors",
        plan.robot.name,
        plan.robot.links.len(),
        plan.robot.joints.len(),
        plan.robot.plugins.len(),
        plan.robot.sensors.len()
    );

    // Validate only mode
    if args.validate {
        println!("Launch plan for '{}' is valid", settings.robot_name);
        println!("  Description: {}", plan.source.display());
        println!("  Bridge config: {}", plan.bridge_config.display());
        println!("  Descriptors: {}", plan.descriptors.len());
        println!("  Execution order: {}", plan.execution_order.join(" -> "));
        return;
    }

    // Dry run mode
    if args.dry_run {
        match render(&plan, args.format) {
            Ok(text) => println!("{}", text),
            Err(e) => {
                log::error!("Failed to render launch plan: {}", e);
                std::process::exit(1);
            }
        }
        return;
    }

    let config = ExecutorConfig::from_settings(&settings.executor, &settings.ros2_command);
    let mut executor = match Executor::new(&plan, config) {
        Ok(e) => e,
        Err(e) => {
            log::error!("Failed to create executor: {}", e);
            std::process::exit(1);
        }
    };

    // Create shutdown channel
    let (shutdown_tx, shutdown_rx) = watch::channel(());

    // Set up Ctrl+C handler
    {
        let shutdown_tx = shutdown_tx.clone();
        if let Err(e) = ctrlc::set_handler(move || {
            log::info!("Received Ctrl+C, initiating shutdown...");
            let _ = shutdown_tx.send(());
        }) {
            log::error!("Error setting Ctrl+C handler: {}", e);
            std::process::exit(1);
        }
    }

    // Launch all processes
    if let Err(e) = executor.launch(shutdown_rx.clone()).await {
        log::error!("Launch failed: {}", e);
        executor.shutdown().await;
        std::process::exit(1);
    }

    // Wait for shutdown signal, a shutdown-on-exit process, or all processes to exit
    executor.wait(shutdown_rx).await;

    executor.shutdown().await;

    log::info!("Mobile robot launcher exiting");
}

fn render(plan: &LaunchPlan, format: PlanFormat) -> Result<String, String> {
    match format {
        PlanFormat::Text => Ok(plan.to_string()),
        PlanFormat::Yaml => serde_yaml::to_string(plan).map_err(|e| e.to_string()),
        PlanFormat::Json => serde_json::to_string_pretty(plan).map_err(|e| e.to_string()),
    }
}
