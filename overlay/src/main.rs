//! Demo: shows a text row, a volume bar and a balance slider, then waits
//! for the display to time out.
//!
//! Run with `DEBUG_LOGGING=1` to see geometry and reactor activity.

use std::thread;
use std::time::Duration;

use osd_overlay::{Content, Osd, OsdConfig, Position};

fn main() {
    osd_overlay::logging::init();

    let config = OsdConfig {
        lines: 3,
        colour: "LawnGreen".to_string(),
        shadow_offset: 2,
        outline_offset: 1,
        timeout_secs: 3,
        position: Position::Bottom,
        vertical_offset: 48,
        ..Default::default()
    };

    let osd = match Osd::from_config(&config) {
        Ok(osd) => osd,
        Err(e) => {
            eprintln!("Failed to create display: {}", e);
            return;
        }
    };

    let steps = [0i64, 20, 40, 60, 80, 100];
    for (i, value) in steps.iter().enumerate() {
        let text = format!("Volume {value}%");
        if let Err(e) = osd
            .display(0, Content::text(text))
            .and_then(|_| osd.display(1, Content::percentage(*value)))
            .and_then(|_| osd.display(2, Content::slider(100 - *value)))
        {
            tracing::error!(error = %e, step = i, "Display failed");
            break;
        }
        thread::sleep(Duration::from_millis(400));
    }

    tracing::info!("Waiting for the display to hide");
    if let Err(e) = osd.wait_until_hidden() {
        tracing::error!(error = %e, "Wait failed");
    }

    if let Err(e) = osd.destroy() {
        tracing::error!(error = %e, "Shutdown failed");
    }
}
