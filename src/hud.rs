use crate::snapshot::RobotStatus;

#[derive(Clone, Copy, Debug, PartialEq, Eq, Default)]
pub enum ConnectionState {
    #[default]
    Connecting,
    Connected,
    Disconnected,
}

impl ConnectionState {
    pub fn label(self) -> &'static str {
        match self {
            ConnectionState::Connecting => "connecting",
            ConnectionState::Connected => "connected",
            ConnectionState::Disconnected => "disconnected",
        }
    }
}

/// Data-to-text state behind the side panel and the window title: battery,
/// robot status, task tallies and transport health.
#[derive(Debug, Default)]
pub struct HudModel {
    pub battery_percentage: Option<f32>,
    pub status: RobotStatus,
    pub tasks_pending: usize,
    pub tasks_completed: usize,
    pub connection: ConnectionState,
    pub transport_note: Option<String>,
}

impl HudModel {
    pub fn set_battery(&mut self, percentage: Option<f32>) {
        if let Some(pct) = percentage {
            self.battery_percentage = Some(pct.clamp(0.0, 100.0));
        }
    }

    pub fn battery_fraction(&self) -> Option<f32> {
        self.battery_percentage.map(|pct| pct / 100.0)
    }

    pub fn title_line(&self) -> String {
        let battery = match self.battery_percentage {
            Some(pct) => format!("{pct:.0}%"),
            None => "--".to_string(),
        };
        format!(
            "Wareview — {} | battery {} | {} | tasks {}/{}",
            self.connection.label(),
            battery,
            self.status.label(),
            self.tasks_pending,
            self.tasks_pending + self.tasks_completed,
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn battery_clamps_to_percentage_range() {
        let mut hud = HudModel::default();
        hud.set_battery(Some(130.0));
        assert_eq!(hud.battery_percentage, Some(100.0));
        hud.set_battery(Some(-5.0));
        assert_eq!(hud.battery_percentage, Some(0.0));
        // missing readings keep the last known value
        hud.set_battery(None);
        assert_eq!(hud.battery_percentage, Some(0.0));
    }

    #[test]
    fn title_line_reflects_state() {
        let mut hud = HudModel::default();
        hud.connection = ConnectionState::Connected;
        hud.set_battery(Some(87.4));
        hud.status = RobotStatus::Moving;
        hud.tasks_pending = 3;
        hud.tasks_completed = 2;
        let title = hud.title_line();
        assert!(title.contains("connected"));
        assert!(title.contains("87%"));
        assert!(title.contains("moving"));
        assert!(title.contains("3/5"));
    }
}
