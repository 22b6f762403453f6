//! MIDI utility functions

const NOTE_NAMES: [&str; 12] = [
    "C", "C#", "D", "D#", "E", "F", "F#", "G", "G#", "A", "A#", "B",
];

/// Scientific pitch name, middle C (60) is `C4`.
pub fn note_name(note: u8) -> Option<String> {
    if note > 127 {
        return None;
    }
    let octave = note as i32 / 12 - 1;
    Some(format!("{}{}", NOTE_NAMES[note as usize % 12], octave))
}

/// Parses names like `c4`, `F#2`, `Bb-1` into MIDI note numbers.
pub fn parse_note_name(name: &str) -> Option<u8> {
    let mut chars = name.chars();
    let letter = chars.next()?.to_ascii_uppercase();
    let base: i32 = match letter {
        'C' => 0,
        'D' => 2,
        'E' => 4,
        'F' => 5,
        'G' => 7,
        'A' => 9,
        'B' => 11,
        _ => return None,
    };

    let rest = chars.as_str();
    let (shift, octave) = if let Some(o) = rest.strip_prefix('#') {
        (1, o)
    } else if let Some(o) = rest.strip_prefix('b') {
        (-1, o)
    } else {
        (0, rest)
    };

    let octave: i32 = octave.parse().ok()?;
    let note = (octave + 1) * 12 + base + shift;
    u8::try_from(note).ok().filter(|n| *n <= 127)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_note_names() {
        assert_eq!(note_name(60).as_deref(), Some("C4"));
        assert_eq!(note_name(69).as_deref(), Some("A4"));
        assert_eq!(note_name(0).as_deref(), Some("C-1"));
        assert_eq!(note_name(127).as_deref(), Some("G9"));
        assert_eq!(note_name(128), None);
    }

    #[test]
    fn test_parse_note_names() {
        assert_eq!(parse_note_name("c4"), Some(60));
        assert_eq!(parse_note_name("F#2"), Some(42));
        assert_eq!(parse_note_name("Bb3"), Some(58));
        assert_eq!(parse_note_name("c-1"), Some(0));
        assert_eq!(parse_note_name("g#9"), None);
        assert_eq!(parse_note_name("h2"), None);
        assert_eq!(parse_note_name(""), None);
    }

    #[test]
    fn test_names_parse_back() {
        for note in 0..=127u8 {
            let name = note_name(note).unwrap();
            assert_eq!(parse_note_name(&name), Some(note));
        }
    }
}
