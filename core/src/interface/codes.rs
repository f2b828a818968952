use serde::{Deserialize, Serialize};
use std::fmt;

/// Network/station/location triple identifying one sensor site.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct StationId {
    pub network: String,
    pub station: String,
    #[serde(default)]
    pub location: String,
}

impl StationId {
    pub fn new(network: &str, station: &str, location: &str) -> Self {
        Self {
            network: network.to_string(),
            station: station.to_string(),
            location: location.to_string(),
        }
    }
}

impl fmt::Display for StationId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}.{}.{}", self.network, self.station, self.location)
    }
}

/// Full network/station/location/channel identity of a recorded channel.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct ChannelId {
    pub network: String,
    pub station: String,
    #[serde(default)]
    pub location: String,
    pub channel: String,
}

impl ChannelId {
    pub fn new(network: &str, station: &str, location: &str, channel: &str) -> Self {
        Self {
            network: network.to_string(),
            station: station.to_string(),
            location: location.to_string(),
            channel: channel.to_string(),
        }
    }

    pub fn station_id(&self) -> StationId {
        StationId::new(&self.network, &self.station, &self.location)
    }
}

impl fmt::Display for ChannelId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{}.{}.{}.{}",
            self.network, self.station, self.location, self.channel
        )
    }
}

/// Structured wildcard pattern over the four channel codes.
///
/// Each field is matched independently: `*` matches any run of characters
/// (including none) and `?` matches exactly one. An empty field only matches
/// an empty code, which matters for the location field. Serialized as the
/// dotted `N.S.L.C` string.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct ChannelPattern {
    pub network: String,
    pub station: String,
    pub location: String,
    pub channel: String,
}

impl TryFrom<String> for ChannelPattern {
    type Error = String;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        ChannelPattern::parse(&value)
            .ok_or_else(|| format!("channel pattern '{value}' must have four dotted fields"))
    }
}

impl From<ChannelPattern> for String {
    fn from(pattern: ChannelPattern) -> Self {
        pattern.to_string()
    }
}

impl ChannelPattern {
    pub fn new(network: &str, station: &str, location: &str, channel: &str) -> Self {
        Self {
            network: network.to_string(),
            station: station.to_string(),
            location: location.to_string(),
            channel: channel.to_string(),
        }
    }

    /// Pattern matching every channel.
    pub fn any() -> Self {
        Self::new("*", "*", "*", "*")
    }

    pub fn exact(id: &ChannelId) -> Self {
        Self::new(&id.network, &id.station, &id.location, &id.channel)
    }

    /// All channels of one station, `N.S.L.<channel>`.
    pub fn station(id: &StationId, channel: &str) -> Self {
        Self::new(&id.network, &id.station, &id.location, channel)
    }

    /// Channel code only, ignoring network, station and location.
    pub fn channel_code(code: &str) -> Self {
        Self::new("*", "*", "*", code)
    }

    /// Parses a dotted `N.S.L.C` pattern.
    pub fn parse(text: &str) -> Option<Self> {
        let parts: Vec<&str> = text.split('.').collect();
        match parts.as_slice() {
            [n, s, l, c] => Some(Self::new(n, s, l, c)),
            _ => None,
        }
    }

    pub fn matches(&self, id: &ChannelId) -> bool {
        self.matches_station(&id.station_id()) && wildcard_match(&self.channel, &id.channel)
    }

    /// Matches the network/station/location fields only.
    pub fn matches_station(&self, id: &StationId) -> bool {
        wildcard_match(&self.network, &id.network)
            && wildcard_match(&self.station, &id.station)
            && wildcard_match(&self.location, &id.location)
    }

    /// True if the pattern contains no wildcard and equals `id`.
    pub fn is_exactly(&self, id: &ChannelId) -> bool {
        self.network == id.network
            && self.station == id.station
            && self.location == id.location
            && self.channel == id.channel
    }
}

impl fmt::Display for ChannelPattern {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{}.{}.{}.{}",
            self.network, self.station, self.location, self.channel
        )
    }
}

/// Glob-style match supporting `*` and `?`.
pub fn wildcard_match(pattern: &str, text: &str) -> bool {
    let p: Vec<char> = pattern.chars().collect();
    let t: Vec<char> = text.chars().collect();
    let (mut pi, mut ti) = (0usize, 0usize);
    let mut star: Option<usize> = None;
    let mut resume = 0usize;

    while ti < t.len() {
        if pi < p.len() && (p[pi] == '?' || p[pi] == t[ti]) {
            pi += 1;
            ti += 1;
        } else if pi < p.len() && p[pi] == '*' {
            star = Some(pi);
            resume = ti;
            pi += 1;
        } else if let Some(star_pos) = star {
            pi = star_pos + 1;
            resume += 1;
            ti = resume;
        } else {
            return false;
        }
    }

    p[pi..].iter().all(|&c| c == '*')
}
