use telegram_dice_bot::{Lang, lang_from_code};

#[test]
fn detects_language_from_message_language_code() {
    assert_eq!(lang_from_code(Some("zh"), Lang::En), Lang::Zh);
}

#[test]
fn detects_language_from_message_language_code_prefix() {
    // locale-style codes like "zh-hans" or "en-US" match on their prefix
    assert_eq!(lang_from_code(Some("zh-hans"), Lang::En), Lang::Zh);
    assert_eq!(lang_from_code(Some("en-US"), Lang::Zh), Lang::En);
}

#[test]
fn unknown_or_missing_code_uses_default() {
    assert_eq!(lang_from_code(Some("it"), Lang::Zh), Lang::Zh);
    assert_eq!(lang_from_code(Some("x"), Lang::En), Lang::En);
    assert_eq!(lang_from_code(None, Lang::Zh), Lang::Zh);
}
