//! The extraction prompt sent alongside the timetable image.
//!
//! The prompt is the main design artifact of this crate. Vision models reading
//! a grid timetable tend to copy a class from one day column into its
//! neighbours, or merge two adjacent boxes into one session. The prompt counters
//! that by spelling out the slot whitelist, forcing a column-by-column scan, and
//! repeating the day-assignment rules before the output schema.
//!
//! The text is rendered by [`build_prompt`] from the slot whitelist
//! ([`crate::schedule::TIME_SLOTS`]) and the field schema ([`SESSION_FIELDS`])
//! so that both can be tested against the [`crate::schedule::ClassSession`]
//! type independently of the prose. Callers can override the whole text via
//! [`crate::config::ExtractionConfig::prompt`].

use crate::schedule::{Day, TimeSlot, TIME_SLOTS};

/// One output field of a class session, with its formatting rule.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SessionField {
    /// JSON key, identical to the `ClassSession` field name.
    pub name: &'static str,
    /// Formatting rule shown to the model in parentheses.
    pub description: &'static str,
}

/// Output schema, in the order the model should emit keys.
pub const SESSION_FIELDS: [SessionField; 8] = [
    SessionField {
        name: "day",
        description: "Monday, Tuesday, Wednesday, Thursday, Friday",
    },
    SessionField {
        name: "start_time",
        description: "in 12-hour format like \"9:00AM\", \"2:00PM\"",
    },
    SessionField {
        name: "end_time",
        description: "in 12-hour format like \"9:50AM\", \"2:50PM\"",
    },
    SessionField {
        name: "course_code",
        description: "e.g., \"CS F213\", \"ECE F241\"",
    },
    SessionField {
        name: "course_name",
        description: "full course name",
    },
    SessionField {
        name: "class_type",
        description: "Lecture, Tutorial, Laboratory/Lab",
    },
    SessionField {
        name: "location",
        description: "room/venue",
    },
    SessionField {
        name: "instructor",
        description: "name or \"Staff\" if not specified",
    },
];

const INTRO: &str =
    "This is an academic timetable image showing a weekly schedule from Monday to Friday.";

const DAY_ASSIGNMENT_RULES: &str = "\
CRITICAL DAY ASSIGNMENT RULES:
- ONLY extract classes from the specific day column you're currently processing
- NEVER copy a class from one day column to another day
- Each class must be assigned to the day column where it actually appears
- A course can have multiple lectures/tutorials/labs in different days of the week (this is normal)
- If you see the same course code in multiple days, this is likely correct - verify by checking the image
- The same course should NOT appear in the same time slot on multiple days (this would be an error)";

const FINAL_CHECK: &str = "\
FINAL CHECK:
- Verify each class is in the correct day column
- Ensure no class appears in multiple days unless actually scheduled that way
- Count classes per day to verify accuracy";

const OUTPUT_ONLY: &str = "Only return the JSON. Do not add explanation or comments.";

/// The built-in prompt: [`build_prompt`] over the default slots and fields.
pub fn default_prompt() -> String {
    build_prompt(&TIME_SLOTS, &SESSION_FIELDS)
}

/// Render the extraction prompt for the given slot whitelist and field schema.
///
/// Pure and deterministic. Section order matters: slots first so the model
/// anchors rows, then the scanning method, then the day rules, then the
/// per-day order, then the schema, then the self-check.
pub fn build_prompt(slots: &[TimeSlot], fields: &[SessionField]) -> String {
    let days = Day::ALL;
    let first = days[0];
    let last = days[days.len() - 1];

    let mut p = String::with_capacity(3072);
    p.push_str(INTRO);
    p.push_str("\n\n");

    // Slot whitelist
    p.push_str("IMPORTANT: The timetable uses these EXACT time slots:\n");
    for slot in slots {
        p.push_str(&format!("- {}\n", slot.label()));
    }
    p.push('\n');

    // Column scanning method
    let columns: Vec<String> = days
        .iter()
        .map(|d| column_name(*d, first, last))
        .collect();
    let span = match (slots.first(), slots.last()) {
        (Some(a), Some(b)) => format!(" ({} to {})", a.start_time(), b.start_time()),
        _ => String::new(),
    };
    p.push_str("STEP-BY-STEP EXTRACTION METHOD:\n");
    p.push_str(&format!(
        "1. Look at the image and identify the {} day columns: {}\n",
        days.len(),
        columns.join(", ")
    ));
    p.push_str(&format!(
        "2. For each day column, scan vertically from top to bottom{span}\n"
    ));
    p.push_str("3. When you find a green box in a day column, extract its information\n");
    p.push_str("4. Each green box = one class session\n");
    p.push_str("5. Consecutive green boxes are DIFFERENT classes (even if they appear adjacent)\n");
    p.push_str("6. Some classes may span multiple time slots (labs), but consecutive boxes with different text are separate\n\n");

    p.push_str(DAY_ASSIGNMENT_RULES);
    p.push_str("\n\n");

    // Per-day order
    p.push_str("EXTRACTION ORDER:\n");
    for (i, day) in days.iter().enumerate() {
        p.push_str(&format!(
            "{}. Process {} column{} - extract ALL green boxes in this column only\n",
            i + 1,
            day,
            position_hint(*day, first, last)
        ));
    }
    p.push('\n');

    // Output schema
    p.push_str("For each class session, extract:\n");
    for field in fields {
        p.push_str(&format!("- {} ({})\n", field.name, field.description));
    }
    p.push('\n');

    p.push_str(FINAL_CHECK);
    p.push_str("\n\n");
    p.push_str(OUTPUT_ONLY);
    p.push('\n');
    p
}

fn position_hint(day: Day, first: Day, last: Day) -> &'static str {
    if day == first {
        " (leftmost)"
    } else if day == last {
        " (rightmost)"
    } else {
        ""
    }
}

fn column_name(day: Day, first: Day, last: Day) -> String {
    format!("{day}{}", position_hint(day, first, last))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::schedule::{ClassSession, ClassType};

    #[test]
    fn lists_every_slot_in_order() {
        let prompt = default_prompt();
        let mut cursor = 0;
        for slot in TIME_SLOTS {
            let label = format!("- {}\n", slot.label());
            let found = prompt[cursor..]
                .find(&label)
                .unwrap_or_else(|| panic!("slot {label:?} missing or out of order"));
            cursor += found + label.len();
        }
        assert!(prompt.contains("- 12:00-12:50 PM\n"));
        assert!(prompt.contains("(8:00AM to 7:00PM)"));
    }

    #[test]
    fn scans_columns_monday_to_friday() {
        let prompt = default_prompt();
        assert!(prompt.contains(
            "identify the 5 day columns: Monday (leftmost), Tuesday, Wednesday, Thursday, Friday (rightmost)"
        ));
        let positions: Vec<usize> = Day::ALL
            .iter()
            .map(|d| {
                prompt
                    .find(&format!("Process {d} column"))
                    .unwrap_or_else(|| panic!("no extraction step for {d}"))
            })
            .collect();
        assert!(positions.windows(2).all(|w| w[0] < w[1]));
        assert!(prompt.contains("1. Process Monday column (leftmost) - extract ALL green boxes in this column only"));
        assert!(prompt.contains("5. Process Friday column (rightmost)"));
    }

    #[test]
    fn keeps_disambiguation_rules() {
        let prompt = default_prompt();
        assert!(prompt.contains("Consecutive green boxes are DIFFERENT classes"));
        assert!(prompt.contains("NEVER copy a class from one day column to another day"));
        assert!(prompt.contains("should NOT appear in the same time slot on multiple days"));
        assert!(prompt.contains("Some classes may span multiple time slots (labs)"));
    }

    #[test]
    fn ends_with_json_only_instruction() {
        let prompt = default_prompt();
        assert!(prompt
            .trim_end()
            .ends_with("Only return the JSON. Do not add explanation or comments."));
        let schema = prompt.find("For each class session, extract:").unwrap();
        let check = prompt.find("FINAL CHECK:").unwrap();
        assert!(schema < check);
    }

    #[test]
    fn schema_fields_match_session_type() {
        let sample = ClassSession {
            day: Day::Monday,
            start_time: "9:00AM".into(),
            end_time: "9:50AM".into(),
            course_code: "CS F213".into(),
            course_name: "Object Oriented Programming".into(),
            class_type: ClassType::Lecture,
            location: "LT1".into(),
            instructor: "Staff".into(),
        };
        let value = serde_json::to_value(&sample).unwrap();
        let keys: Vec<&str> = value
            .as_object()
            .unwrap()
            .keys()
            .map(String::as_str)
            .collect();
        let names: Vec<&str> = SESSION_FIELDS.iter().map(|f| f.name).collect();
        assert_eq!(keys, names);

        let prompt = default_prompt();
        for f in SESSION_FIELDS {
            assert!(prompt.contains(&format!("- {} (", f.name)), "field {} missing", f.name);
        }
    }

    #[test]
    fn day_field_lists_every_day() {
        let days: Vec<&str> = Day::ALL.iter().map(|d| d.as_str()).collect();
        assert_eq!(SESSION_FIELDS[0].description, days.join(", "));
    }

    #[test]
    fn deterministic() {
        assert_eq!(default_prompt(), default_prompt());
    }

    #[test]
    fn renders_custom_slot_set() {
        let slots = &TIME_SLOTS[..2];
        let prompt = build_prompt(slots, &SESSION_FIELDS);
        assert!(prompt.contains("(8:00AM to 9:00AM)"));
        assert!(!prompt.contains("7:00-7:50 PM"));
    }
}
