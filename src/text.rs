//! Case and script folding shared by header detection and column mapping.

const TATWEEL: char = '\u{0640}';

/// Lower-case Latin text and fold Arabic spelling variants.
///
/// Alef forms with hamza or madda collapse to bare alef, alef maqsura to yeh, and
/// tatweel plus short-vowel marks are removed, so `الإجمالي` and `الاجمالي` compare equal.
pub fn fold_case(text: &str) -> String {
    text.chars()
        .flat_map(char::to_lowercase)
        .filter_map(|c| match c {
            '\u{0622}' | '\u{0623}' | '\u{0625}' | '\u{0671}' => Some('\u{0627}'),
            '\u{0649}' => Some('\u{064A}'),
            TATWEEL => None,
            '\u{064B}'..='\u{0652}' | '\u{0670}' => None,
            _ => Some(c),
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_folds_latin_case() {
        assert_eq!(fold_case("Unit PRICE"), "unit price");
    }

    #[test]
    fn test_folds_alef_variants_and_marks() {
        assert_eq!(fold_case("الإجمالي"), fold_case("الاجمالي"));
        assert_eq!(fold_case("الكمـــية"), "الكمية");
        assert_eq!(fold_case("الوَحْدَة"), "الوحدة");
    }
}
