//! Schedule data model: days, slots, class sessions, and the post-hoc validator.
//!
//! The model is asked (via [`crate::prompts`]) to return a JSON array of
//! [`ClassSession`] objects. The persister writes whatever JSON the model
//! produced; the types here are used to *check* that output, never to
//! rewrite it. [`validate_sessions`] flags suspicious entries so an operator
//! can compare them against the image.

use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};
use std::fmt;

/// A teaching day. Column order in the timetable, Monday leftmost.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum Day {
    Monday,
    Tuesday,
    Wednesday,
    Thursday,
    Friday,
}

impl Day {
    /// All days in column order.
    pub const ALL: [Day; 5] = [
        Day::Monday,
        Day::Tuesday,
        Day::Wednesday,
        Day::Thursday,
        Day::Friday,
    ];

    pub fn as_str(self) -> &'static str {
        match self {
            Day::Monday => "Monday",
            Day::Tuesday => "Tuesday",
            Day::Wednesday => "Wednesday",
            Day::Thursday => "Thursday",
            Day::Friday => "Friday",
        }
    }
}

impl fmt::Display for Day {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Kind of session. `"Lab"` is accepted as an alias for `Laboratory`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ClassType {
    Lecture,
    Tutorial,
    #[serde(alias = "Lab")]
    Laboratory,
}

/// One scheduled class occurrence, as the model is asked to emit it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ClassSession {
    pub day: Day,
    /// 12-hour clock, e.g. `"9:00AM"`.
    pub start_time: String,
    /// 12-hour clock, e.g. `"9:50AM"`.
    pub end_time: String,
    pub course_code: String,
    pub course_name: String,
    pub class_type: ClassType,
    pub location: String,
    #[serde(default = "default_instructor")]
    pub instructor: String,
}

fn default_instructor() -> String {
    "Staff".to_string()
}

// ── Time slots ───────────────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Meridiem {
    Am,
    Pm,
}

impl Meridiem {
    fn as_str(self) -> &'static str {
        match self {
            Meridiem::Am => "AM",
            Meridiem::Pm => "PM",
        }
    }
}

/// A fixed fifty-minute teaching slot starting on the hour.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TimeSlot {
    /// Hour on the 12-hour clock (1–12).
    pub hour: u8,
    pub meridiem: Meridiem,
}

impl TimeSlot {
    pub const fn new(hour: u8, meridiem: Meridiem) -> Self {
        Self { hour, meridiem }
    }

    /// Start time in session format, e.g. `"2:00PM"`.
    pub fn start_time(&self) -> String {
        format!("{}:00{}", self.hour, self.meridiem.as_str())
    }

    /// End time in session format, e.g. `"2:50PM"`.
    pub fn end_time(&self) -> String {
        format!("{}:50{}", self.hour, self.meridiem.as_str())
    }

    /// Prompt label, e.g. `"2:00-2:50 PM"`.
    pub fn label(&self) -> String {
        format!("{h}:00-{h}:50 {}", self.meridiem.as_str(), h = self.hour)
    }
}

/// The eleven slots the timetable format uses. There is no 1 PM slot.
pub const TIME_SLOTS: [TimeSlot; 11] = [
    TimeSlot::new(8, Meridiem::Am),
    TimeSlot::new(9, Meridiem::Am),
    TimeSlot::new(10, Meridiem::Am),
    TimeSlot::new(11, Meridiem::Am),
    TimeSlot::new(12, Meridiem::Pm),
    TimeSlot::new(2, Meridiem::Pm),
    TimeSlot::new(3, Meridiem::Pm),
    TimeSlot::new(4, Meridiem::Pm),
    TimeSlot::new(5, Meridiem::Pm),
    TimeSlot::new(6, Meridiem::Pm),
    TimeSlot::new(7, Meridiem::Pm),
];

/// Canonical form for time comparison: no whitespace, upper case.
fn canonical_time(t: &str) -> String {
    t.chars()
        .filter(|c| !c.is_whitespace())
        .flat_map(char::to_uppercase)
        .collect()
}

// ── Validation ───────────────────────────────────────────────────────────

/// A finding from [`validate_sessions`]. Informational only.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub enum ScheduleWarning {
    /// Several different courses claim the same day and start time.
    ConflictingSlot {
        day: Day,
        start_time: String,
        course_codes: Vec<String>,
    },
    /// A start or end time that is not on the slot grid.
    OffGridTime {
        day: Day,
        course_code: String,
        time: String,
    },
    /// The JSON parsed but is not a list of class sessions.
    SchemaMismatch { detail: String },
}

impl fmt::Display for ScheduleWarning {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ScheduleWarning::ConflictingSlot {
                day,
                start_time,
                course_codes,
            } => write!(
                f,
                "{day} {start_time}: conflicting courses {}",
                course_codes.join(", ")
            ),
            ScheduleWarning::OffGridTime {
                day,
                course_code,
                time,
            } => write!(f, "{day} {course_code}: time '{time}' is not on the slot grid"),
            ScheduleWarning::SchemaMismatch { detail } => {
                write!(f, "output does not match the session schema: {detail}")
            }
        }
    }
}

/// Decode `value` as a schedule and validate it.
///
/// A value that does not decode yields a single [`ScheduleWarning::SchemaMismatch`].
pub fn validate_value(value: &serde_json::Value) -> Vec<ScheduleWarning> {
    match Vec::<ClassSession>::deserialize(value) {
        Ok(sessions) => validate_sessions(&sessions),
        Err(e) => vec![ScheduleWarning::SchemaMismatch {
            detail: e.to_string(),
        }],
    }
}

/// Flag conflicting (day, start time) pairs and off-grid times.
///
/// Identical sessions listed twice are not a conflict; only differing
/// course codes in the same slot are reported.
pub fn validate_sessions(sessions: &[ClassSession]) -> Vec<ScheduleWarning> {
    let starts: Vec<String> = TIME_SLOTS.iter().map(TimeSlot::start_time).collect();
    let ends: Vec<String> = TIME_SLOTS.iter().map(TimeSlot::end_time).collect();

    let mut warnings = Vec::new();
    let mut by_slot: BTreeMap<(Day, String), BTreeSet<&str>> = BTreeMap::new();

    for s in sessions {
        let start = canonical_time(&s.start_time);
        let end = canonical_time(&s.end_time);

        if !starts.contains(&start) {
            warnings.push(ScheduleWarning::OffGridTime {
                day: s.day,
                course_code: s.course_code.clone(),
                time: s.start_time.clone(),
            });
        }
        if !ends.contains(&end) {
            warnings.push(ScheduleWarning::OffGridTime {
                day: s.day,
                course_code: s.course_code.clone(),
                time: s.end_time.clone(),
            });
        }

        by_slot
            .entry((s.day, start))
            .or_default()
            .insert(s.course_code.trim());
    }

    for ((day, start_time), codes) in by_slot {
        if codes.len() > 1 {
            warnings.push(ScheduleWarning::ConflictingSlot {
                day,
                start_time,
                course_codes: codes.into_iter().map(str::to_string).collect(),
            });
        }
    }

    warnings
}
