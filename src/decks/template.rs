//! fort.15 rendering from a user-supplied `minijinja` template.
//!
//! The template sees the run dates, the per-phase `ihot` and `rnday`, the
//! output requests and forcing labels. Everything else in the deck is the
//! template author's business.

use super::{ControlDeck, ControlDeckWriter};
use crate::model::{ExecutionPhase, RunConfiguration};
use minijinja::Environment;
use serde_json::json;
use std::io;
use std::path::Path;
use time::format_description::well_known::Rfc3339;

const TEMPLATE_NAME: &str = "fort15";
const SECONDS_PER_DAY: f64 = 86_400.0;

pub struct TemplateControlDeck {
    env: Environment<'static>,
}

impl TemplateControlDeck {
    pub fn from_file(path: &Path) -> io::Result<Self> {
        let source = std::fs::read_to_string(path)?;
        Self::from_source(source)
    }

    pub fn from_source(source: String) -> io::Result<Self> {
        let mut env = Environment::new();
        env.add_template_owned(TEMPLATE_NAME, source)
            .map_err(|e| invalid(format!("failed to parse control deck template: {e}")))?;
        Ok(Self { env })
    }

    fn context(config: &RunConfiguration<'_>, deck: ControlDeck) -> io::Result<serde_json::Value> {
        let spinup_days = config.spinup().as_secs_f64() / SECONDS_PER_DAY;
        let run_days = (config.end_date() - config.start_date()).as_seconds_f64() / SECONDS_PER_DAY;
        // Hotstart RNDAY counts from the coldstart origin.
        let rnday = match deck.phase {
            ExecutionPhase::Single => run_days,
            ExecutionPhase::Coldstart => spinup_days,
            ExecutionPhase::Hotstart => spinup_days + run_days,
        };
        Ok(json!({
            "phase": deck.phase,
            "ihot": deck.restart.ihot(),
            "start_date": format_date(config.start_date())?,
            "end_date": format_date(config.end_date())?,
            "forcing_start_date": format_date(config.forcing_start_date())?,
            "spinup_days": spinup_days,
            "run_days": run_days,
            "rnday": rnday,
            "node_count": config.mesh().node_count(),
            "netcdf": config.netcdf(),
            "outputs": config.outputs(),
            "tidal_forcing": config.tidal_forcing().map(|f| f.label()),
            "wind_forcing": config.wind_forcing().map(|f| f.label()),
            "waves": config.waves().map(|w| w.model.clone()),
        }))
    }
}

impl ControlDeckWriter for TemplateControlDeck {
    fn write_control_deck(
        &self,
        config: &RunConfiguration<'_>,
        deck: ControlDeck,
        path: &Path,
    ) -> io::Result<()> {
        let ctx = Self::context(config, deck)?;
        let rendered = self
            .env
            .get_template(TEMPLATE_NAME)
            .and_then(|t| t.render(ctx))
            .map_err(|e| invalid(format!("control deck render failed: {e}")))?;
        std::fs::write(path, rendered)
    }
}

fn format_date(date: time::OffsetDateTime) -> io::Result<String> {
    date.format(&Rfc3339)
        .map_err(|e| invalid(format!("cannot format {date}: {e}")))
}

fn invalid(msg: String) -> io::Error {
    io::Error::new(io::ErrorKind::InvalidData, msg)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::decks::testing::FakeMesh;
    use crate::model::{OutputTarget, PhysicalVariable, RestartMode, TimeBound};
    use std::time::Duration;
    use time::macros::datetime;

    #[test]
    fn renders_phase_specific_values() {
        let mesh = FakeMesh::new(42);
        let cfg = RunConfiguration::new(
            &mesh,
            datetime!(2024-01-03 0:00 UTC),
            datetime!(2024-01-05 0:00 UTC),
            Duration::from_secs(86_400),
        )
        .unwrap();
        let writer = TemplateControlDeck::from_source(
            "{{ ihot }} ! IHOT\n{{ rnday }} ! RNDAY\n{{ forcing_start_date }}\n{{ node_count }}\n"
                .into(),
        )
        .unwrap();

        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("fort.15.hotstart");
        writer
            .write_control_deck(
                &cfg,
                ControlDeck {
                    phase: ExecutionPhase::Hotstart,
                    restart: RestartMode::Hot,
                },
                &path,
            )
            .unwrap();
        let text = std::fs::read_to_string(&path).unwrap();
        let lines: Vec<&str> = text.lines().collect();
        assert_eq!(lines[0], "567 ! IHOT");
        assert_eq!(lines[1], "3.0 ! RNDAY");
        assert_eq!(lines[2], "2024-01-02T00:00:00Z");
        assert_eq!(lines[3], "42");
    }

    #[test]
    fn spinup_output_settings_reach_the_template() {
        let mesh = FakeMesh::new(3);
        let mut cfg = RunConfiguration::new(
            &mesh,
            datetime!(2024-01-03 0:00 UTC),
            datetime!(2024-01-05 0:00 UTC),
            Duration::from_secs(86_400),
        )
        .unwrap();
        let request = cfg
            .output_request(Some(Duration::from_secs(1800)))
            .unwrap()
            .with_spinup_window(Some(TimeBound::Step(10)), None)
            .unwrap()
            .with_spinup_sampling(Some(Duration::from_secs(3600)))
            .unwrap();
        cfg.set_output(OutputTarget::Surface, PhysicalVariable::Elevation, request);

        let writer = TemplateControlDeck::from_source(
            "{% set e = outputs.surface.elevation %}{{ e.spinup_start }} {{ e.spinup_sampling_interval }}"
                .into(),
        )
        .unwrap();
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("fort.15.coldstart");
        writer
            .write_control_deck(
                &cfg,
                ControlDeck {
                    phase: ExecutionPhase::Coldstart,
                    restart: ExecutionPhase::Coldstart.restart(),
                },
                &path,
            )
            .unwrap();
        assert_eq!(std::fs::read_to_string(&path).unwrap(), "10 1h");
    }

    #[test]
    fn broken_template_is_rejected_up_front() {
        assert!(TemplateControlDeck::from_source("{{ ihot ".into()).is_err());
    }
}
