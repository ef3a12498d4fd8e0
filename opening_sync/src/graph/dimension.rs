//! Filter dimensions: parallel views over the same game stream.

use std::fmt;

use anyhow::{Context, bail};
use serde::{Deserialize, Serialize};

use crate::decode::{DecodedGame, Speed};

/// One filtered view of the graph.
///
/// `Rated` and `Casual` partition `All`; every game lands in exactly one of
/// them. A game with an unknown speed joins no speed dimension.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum Dimension {
    All,
    Rated,
    Casual,
    Speed(Speed),
}

impl Dimension {
    /// Every dimension `game` contributes to.
    pub fn for_game(game: &DecodedGame) -> Vec<Dimension> {
        let mut dims = Vec::with_capacity(3);
        dims.push(Dimension::All);
        dims.push(if game.rated {
            Dimension::Rated
        } else {
            Dimension::Casual
        });
        if let Some(speed) = game.speed {
            dims.push(Dimension::Speed(speed));
        }
        dims
    }

    /// Storage code: `all`, `rated`, `casual`, `speed:<class>`.
    pub fn code(&self) -> String {
        match self {
            Dimension::All => "all".into(),
            Dimension::Rated => "rated".into(),
            Dimension::Casual => "casual".into(),
            Dimension::Speed(s) => format!("speed:{}", s.code()),
        }
    }

    pub fn parse(code: &str) -> anyhow::Result<Self> {
        match code.trim() {
            "all" => Ok(Dimension::All),
            "rated" => Ok(Dimension::Rated),
            "casual" => Ok(Dimension::Casual),
            other => {
                let Some(speed) = other.strip_prefix("speed:") else {
                    bail!("unknown dimension: {other}");
                };
                Speed::from_key(speed)
                    .map(Dimension::Speed)
                    .with_context(|| format!("unknown speed in dimension: {other}"))
            }
        }
    }
}

impl fmt::Display for Dimension {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.code())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn codes_parse_back() {
        let mut all = vec![Dimension::All, Dimension::Rated, Dimension::Casual];
        all.extend(Speed::ALL.map(Dimension::Speed));
        for d in all {
            assert_eq!(Dimension::parse(&d.code()).unwrap(), d);
        }
        assert!(Dimension::parse("speed:hyper").is_err());
        assert!(Dimension::parse("bogus").is_err());
    }
}
