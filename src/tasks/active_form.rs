//! Present-participle labels for work items ("Run tests" -> "Running tests").

fn is_vowel(c: char) -> bool {
    matches!(c.to_ascii_lowercase(), 'a' | 'e' | 'i' | 'o' | 'u')
}

fn is_consonant(c: char) -> bool {
    c.is_ascii_alphabetic() && !is_vowel(c)
}

/// Turn a verb into its "-ing" form.
///
/// A word ending in one vowel followed by one consonant (other than w, x, y)
/// doubles the consonant; a trailing `e` is dropped; anything else gets
/// `ing` appended.
fn present_participle(word: &str) -> String {
    let chars: Vec<char> = word.chars().collect();
    let n = chars.len();

    if n >= 2 {
        let last = chars[n - 1];
        let doubles = is_consonant(last)
            && !matches!(last.to_ascii_lowercase(), 'w' | 'x' | 'y')
            && is_vowel(chars[n - 2])
            && (n == 2 || !is_vowel(chars[n - 3]));
        if doubles {
            return format!("{word}{last}ing");
        }
    }

    match word.strip_suffix(&['e', 'E'][..]) {
        Some(stem) => format!("{stem}ing"),
        None => format!("{word}ing"),
    }
}

fn capitalize(word: &str) -> String {
    let mut chars = word.chars();
    match chars.next() {
        Some(first) => first.to_uppercase().chain(chars).collect(),
        None => String::new(),
    }
}

/// Derive an active-form label from a subject line by transforming its first
/// word. The remaining words are kept as written.
pub fn derive_active_form(subject: &str) -> String {
    let (first, rest) = match subject.split_once(' ') {
        Some((first, rest)) => (first, Some(rest)),
        None => (subject, None),
    };
    if first.is_empty() {
        return subject.to_string();
    }

    let mut label = capitalize(&present_participle(first));
    if let Some(rest) = rest {
        label.push(' ');
        label.push_str(rest);
    }
    label
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn doubles_final_consonant_after_single_vowel() {
        assert_eq!(derive_active_form("Run tests"), "Running tests");
        assert_eq!(derive_active_form("stop the server"), "Stopping the server");
    }

    #[test]
    fn drops_silent_e() {
        assert_eq!(derive_active_form("Write docs"), "Writing docs");
        assert_eq!(derive_active_form("update deps"), "Updating deps");
    }

    #[test]
    fn plain_suffix_otherwise() {
        assert_eq!(derive_active_form("Fix login bug"), "Fixing login bug");
        assert_eq!(derive_active_form("Read the logs"), "Reading the logs");
        assert_eq!(derive_active_form("Show output"), "Showing output");
        assert_eq!(derive_active_form("deploy"), "Deploying");
    }

    #[test]
    fn keeps_remaining_words_verbatim() {
        assert_eq!(
            derive_active_form("add  Two  spaces"),
            "Adding  Two  spaces"
        );
    }

    #[test]
    fn empty_subject_is_unchanged() {
        assert_eq!(derive_active_form(""), "");
        assert_eq!(derive_active_form(" leading"), " leading");
    }
}
