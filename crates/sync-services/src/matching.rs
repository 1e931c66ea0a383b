//! Fuzzy title matching.
//!
//! The only matching contract: direction-agnostic substring containment on
//! lowercased, trimmed forms, where the contained string must be at least
//! two characters. Single-character overlaps are rejected outright so CJK
//! names cannot match on one shared character.

/// Does the search term match any of the candidate titles?
pub fn is_title_match(search_term: &str, titles: &[&str]) -> bool {
    let term_lower = search_term.to_lowercase();
    let term = term_lower.trim();
    if term.is_empty() {
        return false;
    }
    let term_chars = term.chars().count();

    for title in titles {
        let title_lower = title.to_lowercase();
        let title = title_lower.trim();
        let title_chars = title.chars().count();

        if term_chars >= 2 && title.contains(term) {
            return true;
        }
        if title_chars >= 2 && term.contains(title) {
            return true;
        }
    }

    false
}

/// Does any alias (of at least two characters) appear inside the text?
pub fn alias_appears_in(aliases: &[String], text: &str) -> bool {
    let text_lower = text.to_lowercase();
    let text = text_lower.trim();
    for alias in aliases {
        let alias_lower = alias.to_lowercase();
        let alias = alias_lower.trim();
        if alias.chars().count() >= 2 && text.contains(alias) {
            return true;
        }
    }
    false
}

#[cfg(test)]
mod tests {
    use super::*;

    // --- True positives ---

    #[test]
    fn romaji_substring_matches() {
        let titles = [
            "Sousou no Frieren",
            "Frieren: Beyond Journey's End",
            "葬送のフリーレン",
        ];
        assert!(is_title_match("Frieren", &titles));
    }

    #[test]
    fn japanese_exact_matches() {
        assert!(is_title_match("葬送のフリーレン", &["葬送のフリーレン"]));
    }

    #[test]
    fn case_insensitive() {
        assert!(is_title_match("spy×family", &["SPY×FAMILY"]));
    }

    #[test]
    fn title_contained_in_search_term() {
        assert!(is_title_match("Sousou no Frieren Season 2", &["Frieren"]));
    }

    #[test]
    fn kana_titles_match() {
        assert!(is_title_match("ちいかわ", &["Chiikawa", "ちいかわ"]));
    }

    // --- True negatives ---

    #[test]
    fn fulilian_must_not_match_love_live() {
        // Shares only the single character 蓮 with the search term.
        let titles = [
            "Love Live! Hasunosora Jogakuin School Idol Club Movie: Bloom Garden Party",
            "映画 ラブライブ！蓮ノ空女学院スクールアイドルクラブ Bloom Garden Party",
        ];
        assert!(!is_title_match("芙莉蓮", &titles));
    }

    #[test]
    fn fulilian_must_not_match_rendai_utena() {
        let titles = ["Namu Amida Butsu! Rendai Utena", "なむあみだ仏っ! -蓮台 UTENA-"];
        assert!(!is_title_match("芙莉蓮", &titles));
    }

    #[test]
    fn single_char_overlap_rejected() {
        // A one-character title must not be treated as contained.
        assert!(!is_title_match("蓮華", &["蓮"]));
        assert!(!is_title_match("蓮", &["蓮華"]));
    }

    #[test]
    fn unrelated_titles_do_not_match() {
        assert!(!is_title_match("Chiikawa", &["Naruto", "ナルト"]));
    }

    #[test]
    fn empty_inputs_do_not_match() {
        assert!(!is_title_match("", &["Anything"]));
        assert!(!is_title_match("Frieren", &[]));
        assert!(!is_title_match("   ", &["Frieren"]));
    }

    // --- alias containment (video titles) ---

    #[test]
    fn alias_in_video_title() {
        let aliases = vec!["Chiikawa".to_string(), "ちいかわ".to_string()];
        assert!(alias_appears_in(&aliases, "CHIIKAWA episode 1 full"));
        assert!(alias_appears_in(&aliases, "【ちいかわ】アニメまとめ"));
        assert!(!alias_appears_in(&aliases, "unrelated video"));
    }

    #[test]
    fn one_char_alias_never_matches() {
        let aliases = vec!["蓮".to_string()];
        assert!(!alias_appears_in(&aliases, "蓮ノ空女学院"));
    }
}
