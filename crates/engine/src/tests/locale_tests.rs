use super::*;

fn tags(values: &[&str]) -> Vec<LocaleTag> {
    values.iter().map(|value| LocaleTag::new(*value)).collect()
}

#[test]
fn default_locale_is_prepended_when_missing() {
    let languages = Languages::with_locales(LocaleTag::new("en"), tags(&["pl", "de", "pl"]));
    assert_eq!(languages.list(), tags(&["en", "pl", "de"]).as_slice());
    assert_eq!(languages.count(), 3);
}

#[test]
fn next_after_cycles_through_supported_list() {
    let languages = Languages::with_locales(LocaleTag::new("en"), tags(&["en", "pl", "de"]));

    assert_eq!(languages.next_after(&LocaleTag::new("en")), LocaleTag::new("pl"));
    assert_eq!(languages.next_after(&LocaleTag::new("pl")), LocaleTag::new("de"));
    assert_eq!(languages.next_after(&LocaleTag::new("de")), LocaleTag::new("en"));
    assert_eq!(languages.next_after(&LocaleTag::new("xx")), LocaleTag::new("en"));
}

#[test]
fn resolve_falls_back_to_default_for_unsupported() {
    let languages = Languages::with_locales(LocaleTag::new("en"), tags(&["pl"]));

    assert_eq!(languages.resolve(None), LocaleTag::new("en"));
    assert_eq!(languages.resolve(Some(&LocaleTag::new("pl"))), LocaleTag::new("pl"));
    assert_eq!(languages.resolve(Some(&LocaleTag::new("fr"))), LocaleTag::new("en"));
}

#[test]
fn display_names_are_native_and_capitalized() {
    let languages = Languages::default();

    assert_eq!(languages.display_name(&LocaleTag::new("en")), "English");
    assert_eq!(languages.display_name(&LocaleTag::new("pl")), "Polski");
    assert_eq!(languages.display_name(&LocaleTag::new("pt_BR")), "Português");
    assert_eq!(languages.display_name(&LocaleTag::new("xq")), "XQ");
}

#[test]
fn translator_falls_back_to_message_id() {
    let mut catalog = Catalog::new();
    catalog.insert("pl", "{PLAYER} quit...", "{PLAYER} wyszedł...");
    let languages = Languages::default().with_catalog(catalog);

    let pl = languages.translator(&LocaleTag::new("pl"));
    assert_eq!(pl.tr_with("{PLAYER} quit...", &[("{PLAYER}", "Ala")]), "Ala wyszedł...");
    assert_eq!(pl.tr("Join"), "Join");

    let en = languages.translator(&LocaleTag::new("en"));
    assert_eq!(en.tr("{PLAYER} quit..."), "{PLAYER} quit...");
}

#[test]
fn catalogs_load_from_toml_directory() {
    let dir = tempfile::tempdir().expect("tempdir");
    std::fs::write(dir.path().join("pl.toml"), "\"Join\" = \"Dołącz\"\n").expect("write pl");
    std::fs::write(dir.path().join("de.toml"), "\"Join\" = \"Beitreten\"\n").expect("write de");
    std::fs::write(dir.path().join("README.md"), "ignored").expect("write readme");

    let languages = Languages::from_dir(dir.path(), LocaleTag::new("en")).expect("load");
    assert_eq!(languages.list(), tags(&["en", "de", "pl"]).as_slice());
    assert_eq!(languages.translator(&LocaleTag::new("de")).tr("Join"), "Beitreten");
}

#[test]
fn broken_catalog_is_an_error() {
    let dir = tempfile::tempdir().expect("tempdir");
    std::fs::write(dir.path().join("pl.toml"), "not = [valid").expect("write pl");

    assert!(Languages::from_dir(dir.path(), LocaleTag::new("en")).is_err());
}
