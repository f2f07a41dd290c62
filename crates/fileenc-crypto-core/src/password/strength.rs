//! Password strength scoring.
//!
//! Points: length (20 at 8+, 10 at 6+, +10 at 12+, +10 at 16+), 15 for each
//! of upper, lower, digit and symbol, 10 when at least 70% of characters are
//! distinct, and a 20-point penalty for common sequences. The level is
//! chosen from the raw score; the reported score is clamped to 0–100.

use std::collections::HashSet;

use super::SYMBOLS;

const COMMON_PATTERNS: [&str; 5] = ["123", "abc", "qwe", "password", "admin"];

/// Coarse strength bucket.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum StrengthLevel {
    VeryWeak,
    Weak,
    Medium,
    Strong,
    VeryStrong,
}

impl StrengthLevel {
    /// Human-readable label.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::VeryWeak => "very weak",
            Self::Weak => "weak",
            Self::Medium => "medium",
            Self::Strong => "strong",
            Self::VeryStrong => "very strong",
        }
    }

    const fn from_score(score: i32) -> Self {
        match score {
            i32::MIN..=19 => Self::VeryWeak,
            20..=39 => Self::Weak,
            40..=59 => Self::Medium,
            60..=79 => Self::Strong,
            _ => Self::VeryStrong,
        }
    }
}

/// Result of [`evaluate_strength`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PasswordStrength {
    /// 0–100.
    pub score: u8,
    pub level: StrengthLevel,
    /// One hint per missing criterion.
    pub feedback: Vec<String>,
}

/// Score `password`.
#[must_use]
#[allow(clippy::arithmetic_side_effects)]
pub fn evaluate_strength(password: &str) -> PasswordStrength {
    if password.is_empty() {
        return PasswordStrength {
            score: 0,
            level: StrengthLevel::VeryWeak,
            feedback: vec!["Enter a password".into()],
        };
    }

    let mut score: i32 = 0;
    let mut feedback = Vec::new();
    let len = password.chars().count();

    if len >= 8 {
        score += 20;
    } else if len >= 6 {
        score += 10;
    } else {
        feedback.push("Use at least 8 characters".to_owned());
    }
    if len >= 12 {
        score += 10;
    }
    if len >= 16 {
        score += 10;
    }

    let classes: [(bool, &str); 4] = [
        (
            password.chars().any(|c| c.is_ascii_uppercase()),
            "Include uppercase letters",
        ),
        (
            password.chars().any(|c| c.is_ascii_lowercase()),
            "Include lowercase letters",
        ),
        (password.chars().any(|c| c.is_ascii_digit()), "Include numbers"),
        (
            password.bytes().any(|b| SYMBOLS.contains(&b)),
            "Include special characters",
        ),
    ];
    for (present, hint) in classes {
        if present {
            score += 15;
        } else {
            feedback.push(hint.to_owned());
        }
    }

    let distinct = password.chars().collect::<HashSet<_>>().len();
    if distinct * 10 >= len * 7 {
        score += 10;
    }

    let lowered = password.to_lowercase();
    if COMMON_PATTERNS.iter().any(|p| lowered.contains(p)) {
        score -= 20;
    }

    PasswordStrength {
        score: u8::try_from(score.clamp(0, 100)).unwrap_or(0),
        level: StrengthLevel::from_score(score),
        feedback,
    }
}
