//! VeReMi scenario catalog.
//!
//! The dataset ships 225 simulation files indexed 0..225. Each attack type
//! owns a block of 45 indices; inside a block the vehicular density varies
//! slowest (15 indices each) and the attacker density fastest (5 each).

use serde::{Deserialize, Serialize};
use std::fmt;
use std::ops::Range;
use std::str::FromStr;

use crate::error::ConfigError;

const BLOCK: u32 = 45;
const VEHICLE_SPAN: u32 = 15;
const ATTACK_SPAN: u32 = 5;

/// VeReMi attacker behaviour, keyed by its `attackerType` bit flag.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum AttackType {
    /// Constant position x=5560, y=5820.
    ConstantPosition = 1,
    /// Constant offset Δx=250, Δy=-150.
    ConstantOffset = 2,
    /// Uniformly random position in the playground.
    RandomPosition = 4,
    /// Δx, Δy uniformly random from [-300, 300].
    RandomOffset = 8,
    /// Stop probability += 0.025 each position update.
    EventualStop = 16,
}

impl AttackType {
    pub const ALL: [AttackType; 5] = [
        Self::ConstantPosition,
        Self::ConstantOffset,
        Self::RandomPosition,
        Self::RandomOffset,
        Self::EventualStop,
    ];

    pub fn code(self) -> i64 {
        self as i64
    }

    pub fn from_code(code: i64) -> Option<Self> {
        Self::ALL.into_iter().find(|a| a.code() == code)
    }

    pub fn description(self) -> &'static str {
        match self {
            Self::ConstantPosition => "constant position",
            Self::ConstantOffset => "constant offset",
            Self::RandomPosition => "random position",
            Self::RandomOffset => "random offset",
            Self::EventualStop => "eventual stop",
        }
    }

    fn block(self) -> u32 {
        Self::ALL.iter().position(|a| *a == self).unwrap_or(0) as u32
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Density {
    Low,
    Medium,
    High,
}

impl Density {
    pub const ALL: [Density; 3] = [Self::Low, Self::Medium, Self::High];

    fn rank(self) -> u32 {
        match self {
            Self::Low => 0,
            Self::Medium => 1,
            Self::High => 2,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Self::Low => "low",
            Self::Medium => "medium",
            Self::High => "high",
        }
    }
}

/// One cell of the catalog: attack type x vehicle density x attacker density.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Scenario {
    pub attack: AttackType,
    pub vehicles: Density,
    pub attackers: Density,
}

impl Scenario {
    pub fn new(attack: AttackType, vehicles: Density, attackers: Density) -> Self {
        Self {
            attack,
            vehicles,
            attackers,
        }
    }

    /// Scenario of a file index, `None` past the end of the dataset.
    pub fn from_index(index: u32) -> Option<Self> {
        let attack = *AttackType::ALL.get((index / BLOCK) as usize)?;
        let within = index % BLOCK;
        let vehicles = Density::ALL[(within / VEHICLE_SPAN) as usize];
        let attackers = Density::ALL[((within % VEHICLE_SPAN) / ATTACK_SPAN) as usize];
        Some(Self::new(attack, vehicles, attackers))
    }

    /// File indices belonging to this scenario.
    pub fn indices(&self) -> Range<u32> {
        let start = self.attack.block() * BLOCK
            + self.vehicles.rank() * VEHICLE_SPAN
            + self.attackers.rank() * ATTACK_SPAN;
        start..start + ATTACK_SPAN
    }

    pub fn all() -> impl Iterator<Item = Scenario> {
        AttackType::ALL.into_iter().flat_map(|attack| {
            Density::ALL.into_iter().flat_map(move |vehicles| {
                Density::ALL
                    .into_iter()
                    .map(move |attackers| Scenario::new(attack, vehicles, attackers))
            })
        })
    }
}

impl fmt::Display for Scenario {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "attack{}-{}-{}",
            self.attack.code(),
            self.vehicles.as_str(),
            self.attackers.as_str()
        )
    }
}

impl FromStr for Scenario {
    type Err = ConfigError;

    /// Parses `attack<code>-<vehicles>-<attackers>`, e.g. `attack1-low-high`.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let invalid = || ConfigError::InvalidParameter {
            name: "scenario",
            reason: format!("'{}' is not of the form attack<code>-<density>-<density>", s),
        };
        let mut parts = s.trim().split('-');
        let attack = parts
            .next()
            .and_then(|p| p.strip_prefix("attack"))
            .and_then(|code| code.parse::<i64>().ok())
            .and_then(AttackType::from_code)
            .ok_or_else(invalid)?;
        let mut density = || {
            parts
                .next()
                .and_then(|p| Density::ALL.into_iter().find(|d| d.as_str() == p))
                .ok_or_else(invalid)
        };
        let vehicles = density()?;
        let attackers = density()?;
        if parts.next().is_some() {
            return Err(invalid());
        }
        Ok(Self::new(attack, vehicles, attackers))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_known_index_blocks() {
        let s = Scenario::from_index(10).unwrap();
        assert_eq!(s, Scenario::new(AttackType::ConstantPosition, Density::Low, Density::High));
        assert_eq!(s.indices(), 10..15);

        let s = Scenario::from_index(87).unwrap();
        assert_eq!(s, Scenario::new(AttackType::ConstantOffset, Density::High, Density::High));
        assert_eq!(s.indices(), 85..90);

        let s = Scenario::from_index(192).unwrap();
        assert_eq!(s.attack, AttackType::EventualStop);
        assert_eq!(s.indices(), 190..195);

        assert!(Scenario::from_index(225).is_none());
    }

    #[test]
    fn test_catalog_covers_every_index_once() {
        let mut seen = vec![0u32; 225];
        for scenario in Scenario::all() {
            for i in scenario.indices() {
                seen[i as usize] += 1;
                assert_eq!(Scenario::from_index(i), Some(scenario));
            }
        }
        assert!(seen.iter().all(|&n| n == 1));
    }

    #[test]
    fn test_parse_and_display() {
        let s: Scenario = "attack8-high-medium".parse().unwrap();
        assert_eq!(s.indices(), 170..175);
        assert_eq!(s.to_string(), "attack8-high-medium");

        assert!("attack3-low-low".parse::<Scenario>().is_err());
        assert!("attack1-low".parse::<Scenario>().is_err());
        assert!("attack1-low-low-low".parse::<Scenario>().is_err());
    }

    #[test]
    fn test_attack_codes() {
        for attack in AttackType::ALL {
            assert_eq!(AttackType::from_code(attack.code()), Some(attack));
        }
        assert_eq!(AttackType::from_code(0), None);
    }
}
