use serde::{Serialize, Serializer};
use std::fmt;

/// Letter grade for an exam percentage.
///
/// Variants are declared worst-to-best so the derived ordering matches the
/// grading scale: `F < D < C < B < A < A+`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum Grade {
    F,
    D,
    C,
    B,
    A,
    APlus,
}

impl Grade {
    /// All grades in ascending order.
    pub const ALL: [Grade; 6] = [Grade::F, Grade::D, Grade::C, Grade::B, Grade::A, Grade::APlus];

    pub fn letter(self) -> &'static str {
        match self {
            Grade::APlus => "A+",
            Grade::A => "A",
            Grade::B => "B",
            Grade::C => "C",
            Grade::D => "D",
            Grade::F => "F",
        }
    }
}

impl fmt::Display for Grade {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.letter())
    }
}

impl Serialize for Grade {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(self.letter())
    }
}

/// Map a percentage to its letter grade.
///
/// Thresholds are inclusive lower bounds: 90 is already an A+, 80 an A, and
/// so on down to F below 50. Every percentage conversion in the crate goes
/// through this function.
pub fn percentage_to_grade(pct: f64) -> Grade {
    if pct >= 90.0 {
        Grade::APlus
    } else if pct >= 80.0 {
        Grade::A
    } else if pct >= 70.0 {
        Grade::B
    } else if pct >= 60.0 {
        Grade::C
    } else if pct >= 50.0 {
        Grade::D
    } else {
        Grade::F
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_boundary_exactness() {
        assert_eq!(percentage_to_grade(90.0), Grade::APlus);
        assert_eq!(percentage_to_grade(89.99), Grade::A);
        assert_eq!(percentage_to_grade(80.0), Grade::A);
        assert_eq!(percentage_to_grade(70.0), Grade::B);
        assert_eq!(percentage_to_grade(60.0), Grade::C);
        assert_eq!(percentage_to_grade(50.0), Grade::D);
        assert_eq!(percentage_to_grade(49.99), Grade::F);
        assert_eq!(percentage_to_grade(0.0), Grade::F);
        assert_eq!(percentage_to_grade(100.0), Grade::APlus);
    }

    #[test]
    fn test_monotonic_mapping() {
        let mut prev = percentage_to_grade(0.0);
        let mut pct = 0.0;
        while pct <= 100.0 {
            let grade = percentage_to_grade(pct);
            assert!(grade >= prev, "grade dropped between {} and {}", pct - 0.25, pct);
            prev = grade;
            pct += 0.25;
        }
    }

    #[test]
    fn test_idempotent_and_pure() {
        for pct in [12.5, 50.0, 73.2, 91.0] {
            assert_eq!(percentage_to_grade(pct), percentage_to_grade(pct));
        }
    }

    #[test]
    fn test_letters_serialize_as_strings() {
        let json = serde_json::to_string(&Grade::APlus).unwrap();
        assert_eq!(json, "\"A+\"");
        let json = serde_json::to_string(&Grade::F).unwrap();
        assert_eq!(json, "\"F\"");
    }

    #[test]
    fn test_grade_rank_ordering() {
        assert!(Grade::F < Grade::D);
        assert!(Grade::D < Grade::C);
        assert!(Grade::C < Grade::B);
        assert!(Grade::B < Grade::A);
        assert!(Grade::A < Grade::APlus);
    }
}
