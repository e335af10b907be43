//! FM2 → FM3 names for built-ins (`x?upper_case`), built-in variables
//! (`.current_node`), settings (`<#setting number_format=...>`) and `#ftl`
//! header parameters.
//!
//! FM3 spells everything in camel case. A handful of names were renamed
//! outright rather than re-cased; those come from the alias tables, which are
//! consulted before the generic conversion.

use once_cell::sync::Lazy;
use std::collections::{BTreeSet, HashMap};

use crate::errors::ErrorKind;

static BUILTIN_ALIASES: Lazy<HashMap<&'static str, &'static str>> = Lazy::new(|| {
    HashMap::from([
        ("webSafe", "html"),
        ("web_safe", "html"),
        ("iso_utc_fz", "isoUtcFZ"),
        ("iso_utc_nz", "isoUtcNZ"),
        ("iso_utc_ms_nz", "isoUtcMsNZ"),
        ("iso_utc_m_nz", "isoUtcMNZ"),
        ("iso_utc_h_nz", "isoUtcHNZ"),
        ("iso_local_nz", "isoLocalNZ"),
        ("iso_local_ms_nz", "isoLocalMsNZ"),
        ("iso_local_m_nz", "isoLocalMNZ"),
        ("iso_local_h_nz", "isoLocalHNZ"),
        ("iso_nz", "isoNZ"),
        ("iso_ms_nz", "isoMsNZ"),
        ("iso_m_nz", "isoMNZ"),
        ("iso_h_nz", "isoHNZ"),
    ])
});

static BUILTIN_VARIABLE_ALIASES: Lazy<HashMap<&'static str, &'static str>> = Lazy::new(|| {
    HashMap::from([
        ("current_node", "node"),
        ("currentNode", "node"),
        ("template_name", "currentTemplateName"),
        ("templateName", "currentTemplateName"),
    ])
});

static SETTING_ALIASES: Lazy<HashMap<&'static str, &'static str>> = Lazy::new(|| {
    HashMap::from([
        ("datetime_format", "dateTimeFormat"),
        ("datetimeFormat", "dateTimeFormat"),
    ])
});

/// `upper_case` → `upperCase`. Every word is lower-cased first, so
/// `ISO_UTC` → `isoUtc`; leading, trailing and doubled underscores vanish.
pub fn snake_case_to_camel_case(name: &str) -> String {
    let mut result = String::with_capacity(name.len());
    for word in name.split('_').filter(|w| !w.is_empty()) {
        let word = word.to_lowercase();
        if result.is_empty() {
            result.push_str(&word);
        } else {
            let mut chars = word.chars();
            if let Some(first) = chars.next() {
                result.extend(first.to_uppercase());
                result.push_str(chars.as_str());
            }
        }
    }
    result
}

/// The FM3 spelling a built-in name converts to, before validation.
pub fn convert_builtin_name(name: &str) -> String {
    if let Some(alias) = BUILTIN_ALIASES.get(name) {
        return alias.to_string();
    }
    if !name.contains('_') {
        return name.to_string();
    }
    let converted = snake_case_to_camel_case(name);
    match BUILTIN_ALIASES.get(converted.as_str()) {
        Some(alias) => alias.to_string(),
        None => converted,
    }
}

/// Maps an FM2 built-in name and checks the result against `known`.
pub fn map_builtin_name(name: &str, known: &BTreeSet<String>) -> Result<String, ErrorKind> {
    let converted = convert_builtin_name(name);
    if known.contains(&converted) {
        Ok(converted)
    } else {
        Err(ErrorKind::BuiltInMapping {
            name: name.to_string(),
            attempted: converted,
        })
    }
}

pub fn map_builtin_variable_name(
    name: &str,
    known: &BTreeSet<String>,
) -> Result<String, ErrorKind> {
    let converted = match BUILTIN_VARIABLE_ALIASES.get(name) {
        Some(alias) => alias.to_string(),
        None if !name.contains('_') => name.to_string(),
        None => snake_case_to_camel_case(name),
    };
    if known.contains(&converted) {
        Ok(converted)
    } else {
        Err(ErrorKind::BuiltInVariableMapping {
            name: format!(".{}", name),
            attempted: format!(".{}", converted),
        })
    }
}

/// Maps a `#setting` name and checks the result against `known`.
/// `classic_compatible` has no FM3 counterpart at all.
pub fn map_setting_name(name: &str, known: &BTreeSet<String>) -> Result<String, ErrorKind> {
    let converted = match SETTING_ALIASES.get(name) {
        Some(alias) => alias.to_string(),
        None if !name.contains('_') => name.to_string(),
        None => snake_case_to_camel_case(name),
    };
    if converted == "classicCompatible" {
        return Err(ErrorKind::UnconvertibleFeature {
            message: "The \"classicCompatible\" setting doesn't exist in FM3. You have to \
                      remove it manually before conversion."
                .to_string(),
        });
    }
    if known.contains(&converted) {
        Ok(converted)
    } else {
        Err(ErrorKind::SettingMapping {
            name: name.to_string(),
            attempted: converted,
        })
    }
}

/// `strip_whitespace` → `stripWhitespace`; `attributes` became
/// `customSettings`.
pub fn convert_ftl_parameter_name(name: &str) -> String {
    let converted = if name.contains('_') {
        snake_case_to_camel_case(name)
    } else {
        name.to_string()
    };
    if converted == "attributes" {
        "customSettings".to_string()
    } else {
        converted
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::target::{Fm3Dialect, TargetDialect};

    fn map(name: &str) -> Result<String, ErrorKind> {
        map_builtin_name(name, Fm3Dialect.builtin_names())
    }

    #[test]
    fn camel_case_conversion() {
        assert_eq!(snake_case_to_camel_case("upper_case"), "upperCase");
        assert_eq!(snake_case_to_camel_case("__left__pad_"), "leftPad");
        assert_eq!(snake_case_to_camel_case("ISO_UTC"), "isoUtc");
        assert_eq!(snake_case_to_camel_case("x"), "x");
    }

    #[test]
    fn maps_common_builtins() {
        assert_eq!(map("upper_case").unwrap(), "upperCase");
        assert_eq!(map("left_pad").unwrap(), "leftPad");
        assert_eq!(map("upperCase").unwrap(), "upperCase");
        assert_eq!(map("size").unwrap(), "size");
    }

    #[test]
    fn aliases_override_conversion() {
        assert_eq!(map("web_safe").unwrap(), "html");
        assert_eq!(map("webSafe").unwrap(), "html");
        assert_eq!(map("iso_utc_fz").unwrap(), "isoUtcFZ");
        assert_eq!(map("iso_local_ms_nz").unwrap(), "isoLocalMsNZ");
    }

    #[test]
    fn unknown_names_fail_with_attempt() {
        assert_eq!(
            map("no_such_thing"),
            Err(ErrorKind::BuiltInMapping {
                name: "no_such_thing".into(),
                attempted: "noSuchThing".into(),
            })
        );
        assert!(map("default").is_err());
        assert!(map("if_exists").is_err());
    }

    #[test]
    fn setting_names() {
        let known = Fm3Dialect.setting_names();
        assert_eq!(map_setting_name("number_format", known).unwrap(), "numberFormat");
        assert_eq!(map_setting_name("locale", known).unwrap(), "locale");
        assert_eq!(map_setting_name("datetime_format", known).unwrap(), "dateTimeFormat");
        assert_eq!(map_setting_name("timeZone", known).unwrap(), "timeZone");
        assert!(matches!(
            map_setting_name("classic_compatible", known),
            Err(ErrorKind::UnconvertibleFeature { .. })
        ));
        assert_eq!(
            map_setting_name("bogus_thing", known),
            Err(ErrorKind::SettingMapping {
                name: "bogus_thing".into(),
                attempted: "bogusThing".into(),
            })
        );
    }

    #[test]
    fn ftl_parameter_names() {
        assert_eq!(convert_ftl_parameter_name("strip_whitespace"), "stripWhitespace");
        assert_eq!(convert_ftl_parameter_name("ns_prefixes"), "nsPrefixes");
        assert_eq!(convert_ftl_parameter_name("attributes"), "customSettings");
        assert_eq!(convert_ftl_parameter_name("encoding"), "encoding");
        assert_eq!(convert_ftl_parameter_name("autoEsc"), "autoEsc");
    }

    #[test]
    fn builtin_variables() {
        let dialect = Fm3Dialect;
        let known = dialect.builtin_variable_names();
        assert_eq!(map_builtin_variable_name("current_node", known).unwrap(), "node");
        assert_eq!(
            map_builtin_variable_name("template_name", known).unwrap(),
            "currentTemplateName"
        );
        assert_eq!(map_builtin_variable_name("data_model", known).unwrap(), "dataModel");
        assert_eq!(map_builtin_variable_name("now", known).unwrap(), "now");
        assert_eq!(map_builtin_variable_name("outputFormat", known).unwrap(), "outputFormat");
        assert_eq!(map_builtin_variable_name("dataModel", known).unwrap(), "dataModel");
        assert_eq!(
            map_builtin_variable_name("mainTemplateName", known).unwrap(),
            "mainTemplateName"
        );
        assert_eq!(
            map_builtin_variable_name("nonsense", known),
            Err(ErrorKind::BuiltInVariableMapping {
                name: ".nonsense".into(),
                attempted: ".nonsense".into(),
            })
        );
    }
}
