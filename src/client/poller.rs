use sb_stateframe::hardware::{self, HardwareError, OvroStarburst};
use sb_stateframe::{labview_now, parse, Assembled, Assembler, Frame, MonitorRecord, RawValue};
use tokio::time::{interval, Duration, MissedTickBehavior};
use tracing::{debug, error, info, warn};

use crate::state::app_state::{AppState, SchemaInfo, Snapshot};

/// Poll the hardware forever, publishing one frame per tick. The schema is
/// emitted until one has been produced and checked.
pub async fn start_polling(state: AppState, assembler: Assembler, period: Duration) {
    let mut ticker = interval(period);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);
    let mut sequence: u64 = 0;

    info!(
        "Polling {:?} frame every {:?} ({} bytes)",
        assembler.frame(),
        period,
        assembler.frame().size()
    );

    loop {
        ticker.tick().await;
        let emit_schema = state.schema.read().await.is_none();

        let task_state = state.clone();
        let task_assembler = assembler.clone();
        let polled = tokio::task::spawn_blocking(move || {
            let (record, hw_error) = collect(&task_state);
            let out = task_assembler.assemble(&record, emit_schema);
            (out, hw_error)
        })
        .await;

        let (out, hardware_error) = match polled {
            Ok(result) => result,
            Err(e) => {
                error!("Poll task failed: {}", e);
                continue;
            }
        };

        sequence += 1;
        publish(&state, out, hardware_error, sequence).await;
    }
}

async fn publish(state: &AppState, out: Assembled, hardware_error: Option<String>, sequence: u64) {
    if let Some(xml) = out.schema {
        match parse(&xml) {
            Ok(table) if table.size() == out.buffer.len() => {
                *state.schema.write().await = Some(SchemaInfo { xml, table });
            }
            Ok(table) => error!(
                "Schema describes {} bytes but frame has {}",
                table.size(),
                out.buffer.len()
            ),
            Err(e) => error!("Emitted schema does not parse: {}", e),
        }
    }

    let timestamp = labview_now();
    debug!("Frame {} published ({} bytes)", sequence, out.buffer.len());
    *state.snapshot.write().await = Snapshot {
        buffer: out.buffer,
        format: out.format,
        timestamp,
        sequence,
        hardware_error,
    };
}

/// Monitor data for one frame. Hardware failures are logged and yield an
/// empty input, so the frame keeps its size and carries defaults.
fn collect(state: &AppState) -> (MonitorRecord, Option<String>) {
    let (units, hardware_error) = match read_units(state) {
        Ok(units) => (units, None),
        Err(e) => {
            warn!("Hardware poll failed, publishing defaults: {}", e);
            (MonitorRecord::new(), Some(e.to_string()))
        }
    };
    (frame_record(state.config.frame, units), hardware_error)
}

fn read_units(state: &AppState) -> hardware::Result<MonitorRecord> {
    let mut guard = state.system.blocking_lock();
    if guard.is_none() {
        let system = OvroStarburst::connect(state.connector.as_ref(), &state.config.devices)?;
        *guard = Some(system);
    }

    let system = guard
        .as_mut()
        .ok_or_else(|| HardwareError::NotConnected(state.config.devices.lonoise.identifier.clone()))?;

    match system.monitor_data() {
        Ok(data) => Ok(data),
        Err(e) => {
            if matches!(e, HardwareError::NotConnected(_)) {
                // reconnect on the next tick
                system.end_connection();
                *guard = None;
            }
            Err(e)
        }
    }
}

/// Wrap unit records in the input layout of `frame`.
pub fn frame_record(frame: Frame, units: MonitorRecord) -> MonitorRecord {
    match frame {
        Frame::Ovro => units,
        Frame::Starburst => {
            let mut record = MonitorRecord::new();
            record.insert("timestamp".to_string(), RawValue::Float(labview_now()));
            record.insert("starburst".to_string(), RawValue::from(units));
            record
        }
    }
}
