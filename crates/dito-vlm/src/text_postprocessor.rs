/// Cleans a decoded caption: trims whitespace and drops one trailing period.
pub fn clean_caption(text: &str) -> String {
    let caption = text.trim();
    caption.strip_suffix('.').unwrap_or(caption).to_string()
}

#[cfg(test)]
mod tests {
    use super::clean_caption;

    #[test]
    fn trims_and_drops_period() {
        assert_eq!(clean_caption("  a dog on a couch. \n"), "a dog on a couch");
        assert_eq!(clean_caption("a red car"), "a red car");
    }

    #[test]
    fn only_one_period_is_removed() {
        assert_eq!(clean_caption("wait.."), "wait.");
        assert_eq!(clean_caption("."), "");
        assert_eq!(clean_caption(""), "");
    }
}
