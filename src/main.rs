use breeze_blue_link::domain::commander::ControlInputs;
use breeze_blue_link::domain::models::{AppEvent, MessageSeverity};
use breeze_blue_link::domain::motion::MotionBuffer;
use breeze_blue_link::domain::settings::SettingsService;
use breeze_blue_link::infrastructure::link::simulated::SimulatedTransport;
use breeze_blue_link::infrastructure::logging::init_logger;
use breeze_blue_link::{ControlMode, FlightLink};
use tracing::{debug, error, info, warn};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let settings_service = SettingsService::new()?;
    let settings = settings_service.get().clone();

    let _logging_guard = init_logger(&settings.log_settings)
        .map_err(|e| eprintln!("Failed to initialize logging: {}", e))
        .ok();

    info!("Starting BreezeBlue flight link");
    debug!("Settings loaded from {}", settings_service.path().display());
    info!(
        "BLE profile: service {}, CRTP {}, CRTP up {}",
        settings.ble_service_uuid, settings.ble_crtp_char_uuid, settings.ble_crtp_up_char_uuid
    );

    let motion = (settings.control_mode == ControlMode::Tilt).then(|| {
        MotionBuffer::new(MotionBuffer::DEFAULT_CAPACITY, settings.tilt_max_angle_deg)
    });
    let inputs = ControlInputs::new(settings.right_deadband_x, motion);

    let transport_config = settings.simulated_config();
    let link = FlightLink::spawn(settings.link_config(), |events| {
        SimulatedTransport::new(events, transport_config)
    });
    let (observer_id, mut events) = link.observers().register();

    match settings
        .control_mode
        .commander(&inputs, settings.sensitivity)
    {
        Some(commander) => link.set_commander(commander)?,
        None => warn!(
            "No commander available for {:?}; ticks will be skipped",
            settings.control_mode
        ),
    }

    link.connect()?;

    loop {
        tokio::select! {
            event = events.recv() => match event {
                Some(AppEvent::StateChanged(state)) => {
                    info!("Link {} ({:.0}%)", state, state.progress() * 100.0);
                }
                Some(AppEvent::Failed { title, message }) => {
                    error!("{}: {}", title, message.unwrap_or_default());
                }
                Some(AppEvent::LogMessage(status)) => match status.severity {
                    MessageSeverity::Warning | MessageSeverity::Error => warn!("{}", status.message),
                    MessageSeverity::Info | MessageSeverity::Success => info!("{}", status.message),
                },
                Some(AppEvent::CommandSent { sequence }) => {
                    if sequence % 100 == 0 {
                        debug!("{} command packets sent", sequence);
                    }
                }
                None => break,
            },
            _ = tokio::signal::ctrl_c() => {
                info!("Shutting down");
                break;
            }
        }
    }

    link.observers().unregister(observer_id);
    let stats = link.stats();
    link.shutdown().await?;
    info!(
        "Flight link stopped: {} ticks, {} sent, {} skipped",
        stats.ticks, stats.sent, stats.skipped
    );

    Ok(())
}
