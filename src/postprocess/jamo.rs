//! Hangul jamo reconstruction.
//!
//! Korean OCR engines often emit decomposed compatibility jamo (U+3131..)
//! instead of precomposed syllables. This module composes consecutive
//! initial+vowel(+trailing) sequences back into the U+AC00 syllable block and
//! cleans up the filler and middle-dot characters the engines substitute.

use once_cell::sync::Lazy;
use regex::Regex;

/// Hangul filler, emitted in place of spaces.
const FILLER: char = '\u{3164}';
/// Compatibility middle dot, normalized to U+00B7.
const COMPAT_MIDDLE_DOT: char = '\u{318D}';

static MULTI_SPACE: Lazy<Regex> = Lazy::new(|| Regex::new(r"[ \t]{2,}").unwrap());

/// Compatibility consonant to initial (choseong) index.
fn initial_index(ch: char) -> Option<u32> {
    Some(match ch {
        '\u{3131}' => 0,
        '\u{3132}' => 1,
        '\u{3134}' => 2,
        '\u{3137}' => 3,
        '\u{3138}' => 4,
        '\u{3139}' => 5,
        '\u{3141}' => 6,
        '\u{3142}' => 7,
        '\u{3143}' => 8,
        '\u{3145}' => 9,
        '\u{3146}' => 10,
        '\u{3147}' => 11,
        '\u{3148}' => 12,
        '\u{3149}' => 13,
        '\u{314A}' => 14,
        '\u{314B}' => 15,
        '\u{314C}' => 16,
        '\u{314D}' => 17,
        '\u{314E}' => 18,
        _ => return None,
    })
}

/// Compatibility vowel to medial (jungseong) index.
fn medial_index(ch: char) -> Option<u32> {
    let cp = ch as u32;
    if (0x314F..=0x3163).contains(&cp) {
        Some(cp - 0x314F)
    } else {
        None
    }
}

/// Compatibility consonant to final (jongseong) index; 0 means no final, so
/// the indices start at 1.
fn final_index(ch: char) -> Option<u32> {
    Some(match ch {
        '\u{3131}' => 1,
        '\u{3132}' => 2,
        '\u{3134}' => 4,
        '\u{3137}' => 7,
        '\u{3139}' => 8,
        '\u{3141}' => 16,
        '\u{3142}' => 17,
        '\u{3145}' => 19,
        '\u{3146}' => 20,
        '\u{3147}' => 21,
        '\u{3148}' => 22,
        '\u{314A}' => 23,
        '\u{314B}' => 24,
        '\u{314C}' => 25,
        '\u{314D}' => 26,
        '\u{314E}' => 27,
        _ => return None,
    })
}

/// Fixes common jamo-level OCR errors in `text`.
///
/// Replaces the Hangul filler with a space and the compatibility middle dot
/// with U+00B7, collapses runs of spaces and tabs, composes jamo sequences,
/// and trims the result.
pub fn fix_jamo_errors(text: &str) -> String {
    if text.is_empty() {
        return String::new();
    }

    let replaced: String = text
        .chars()
        .map(|ch| match ch {
            FILLER => ' ',
            COMPAT_MIDDLE_DOT => '\u{00B7}',
            other => other,
        })
        .collect();

    let collapsed = MULTI_SPACE.replace_all(&replaced, " ");
    compose_jamo(&collapsed).trim().to_string()
}

/// Composes compatibility jamo runs into precomposed syllables.
///
/// A consonant followed by a vowel starts a syllable. A following consonant
/// becomes the trailing jongseong unless it is itself followed by a vowel, in
/// which case it is the next syllable's initial and is left unconsumed.
fn compose_jamo(text: &str) -> String {
    let chars: Vec<char> = text.chars().collect();
    let n = chars.len();
    let mut out = String::with_capacity(text.len());
    let mut i = 0;

    while i < n {
        let (Some(initial), Some(&next)) = (initial_index(chars[i]), chars.get(i + 1)) else {
            out.push(chars[i]);
            i += 1;
            continue;
        };
        let Some(medial) = medial_index(next) else {
            out.push(chars[i]);
            i += 1;
            continue;
        };

        let mut fin = 0;
        if let Some(&candidate) = chars.get(i + 2) {
            if let Some(index) = final_index(candidate) {
                let starts_next_syllable = chars
                    .get(i + 3)
                    .is_some_and(|&after| medial_index(after).is_some());
                if !starts_next_syllable {
                    fin = index;
                    i += 1;
                }
            }
        }

        let syllable = 0xAC00 + initial * 21 * 28 + medial * 28 + fin;
        // The formula stays inside the syllable block for all valid indices.
        if let Some(ch) = char::from_u32(syllable) {
            out.push(ch);
        }
        i += 2;
    }

    out
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn composes_simple_syllable() {
        assert_eq!(fix_jamo_errors("ㄱㅏ"), "가");
        assert_eq!(fix_jamo_errors("ㅎㅏㄴ"), "한");
    }

    #[test]
    fn trailing_consonant_left_for_next_syllable() {
        // ㄱㅏㄴㅏ: the ㄴ starts the next syllable, so 가나 not 간ㅏ.
        assert_eq!(fix_jamo_errors("ㄱㅏㄴㅏ"), "가나");
        // ㅎㅏㄴㄱㅡㄹ: ㄴ closes the first syllable since ㄱ follows.
        assert_eq!(fix_jamo_errors("ㅎㅏㄴㄱㅡㄹ"), "한글");
    }

    #[test]
    fn precomposed_text_is_untouched() {
        assert_eq!(fix_jamo_errors("한글 책"), "한글 책");
        assert_eq!(fix_jamo_errors("plain ascii."), "plain ascii.");
    }

    #[test]
    fn filler_and_middle_dot_are_normalized() {
        assert_eq!(fix_jamo_errors("가\u{3164}나"), "가 나");
        assert_eq!(fix_jamo_errors("가\u{318D}나"), "가\u{00B7}나");
    }

    #[test]
    fn space_runs_collapse() {
        assert_eq!(fix_jamo_errors("가   나\t\t다"), "가 나 다");
    }

    #[test]
    fn isolated_consonant_passes_through() {
        assert_eq!(fix_jamo_errors("ㄱ"), "ㄱ");
        assert_eq!(fix_jamo_errors("가ㄹ"), "가ㄹ");
    }
}
