use std::fmt::Display;

/// Orientation of a feature in the genome, as written in the 7th column of GFF files.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default)]
pub enum Orientation {
    Forward,
    Reverse,
    /// Unstranded or unknown.
    #[default]
    Dual,
}

impl Orientation {
    pub fn symbol(&self) -> char {
        match self {
            Orientation::Forward => '+',
            Orientation::Reverse => '-',
            Orientation::Dual => '.',
        }
    }
}

impl Display for Orientation {
    fn fmt(&self, f: &mut std::fmt::Formatter) -> std::fmt::Result {
        write!(f, "{}", self.symbol())
    }
}

impl TryFrom<char> for Orientation {
    type Error = ();

    fn try_from(value: char) -> Result<Self, Self::Error> {
        match value {
            '+' => Ok(Orientation::Forward),
            '-' => Ok(Orientation::Reverse),
            '.' | '?' => Ok(Orientation::Dual),
            _ => Err(()),
        }
    }
}
