//! Edge event types shared by the pulse sources.

use serde::{Deserialize, Serialize};

/// Signal transition direction.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Edge {
    /// High-to-low; the GM tube output idles high
    #[default]
    Falling,
    Rising,
}

impl std::fmt::Display for Edge {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Edge::Falling => write!(f, "falling"),
            Edge::Rising => write!(f, "rising"),
        }
    }
}

impl std::str::FromStr for Edge {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "falling" => Ok(Edge::Falling),
            "rising" => Ok(Edge::Rising),
            other => Err(format!("unknown edge '{other}'")),
        }
    }
}

/// Which pulse source feeds the counter.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SourceKind {
    /// Event lines from libgpiod's `gpiomon`
    #[default]
    Gpiomon,
    /// Fixed-rate generator
    Simulated,
}

impl std::str::FromStr for SourceKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "gpiomon" => Ok(SourceKind::Gpiomon),
            "simulated" | "sim" => Ok(SourceKind::Simulated),
            other => Err(format!("unknown source '{other}'")),
        }
    }
}

/// A single transition reported by the input line.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct EdgeEvent {
    pub edge: Edge,
    /// GPIO line offset, when the source reports it
    pub offset: Option<u32>,
}

impl EdgeEvent {
    /// Parse one `gpiomon` output line.
    ///
    /// Accepts the libgpiod v1 layout
    /// (`event: FALLING EDGE offset: 14 timestamp: [..]`) and the tab-separated
    /// v2 layout (`<ts>\tfalling\tgpiochip0 14`), where the offset is not
    /// reliably present. Returns `None` for lines that carry no edge.
    pub fn parse_gpiomon(line: &str) -> Option<Self> {
        let mut edge = None;
        let mut offset = None;
        let mut tokens = line.split_whitespace();

        while let Some(token) = tokens.next() {
            let lower = token.to_ascii_lowercase();
            match lower.as_str() {
                "falling" => edge = edge.or(Some(Edge::Falling)),
                "rising" => edge = edge.or(Some(Edge::Rising)),
                "offset:" => offset = tokens.next().and_then(|v| v.parse().ok()),
                _ => {}
            }
        }

        edge.map(|edge| EdgeEvent { edge, offset })
    }
}

/// Decides which edges count as pulses.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct EdgeFilter {
    pub pin: u32,
    pub edge: Edge,
}

impl EdgeFilter {
    pub fn qualifies(&self, event: &EdgeEvent) -> bool {
        event.edge == self.edge && event.offset.map_or(true, |offset| offset == self.pin)
    }
}
