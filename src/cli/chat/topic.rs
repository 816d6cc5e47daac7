use std::fmt;
use std::str::FromStr;

use clap::ValueEnum;
use thiserror::Error;

/// Domain label injected into every prompt to bias its wording.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, ValueEnum)]
pub enum Topic {
    #[default]
    General,
    Sql,
    Python,
    PowerBi,
    DataHandling,
}

impl Topic {
    pub const ALL: [Topic; 5] = [
        Topic::General,
        Topic::Sql,
        Topic::Python,
        Topic::PowerBi,
        Topic::DataHandling,
    ];

    pub fn label(&self) -> &'static str {
        match self {
            Topic::General => "General",
            Topic::Sql => "SQL",
            Topic::Python => "Python",
            Topic::PowerBi => "Power BI",
            Topic::DataHandling => "Data Handling",
        }
    }
}

impl fmt::Display for Topic {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

#[derive(Debug, Error, PartialEq)]
#[error("unknown topic '{0}', expected one of: General, SQL, Python, Power BI, Data Handling")]
pub struct UnknownTopic(pub String);

impl FromStr for Topic {
    type Err = UnknownTopic;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        // "Power BI", "power-bi", "POWER_BI" and "powerbi" all name the same topic
        let key: String = s
            .chars()
            .filter(|c| !matches!(c, ' ' | '-' | '_'))
            .flat_map(char::to_lowercase)
            .collect();

        Topic::ALL
            .into_iter()
            .find(|topic| topic.label().replace(' ', "").to_lowercase() == key)
            .ok_or_else(|| UnknownTopic(s.trim().to_string()))
    }
}
