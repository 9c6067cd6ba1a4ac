//! String inflection used for naming conventions.
//!
//! Class names map to table names (`Author` → `authors`), relationship names
//! map to class names (`books` → `Book`), and class names map to foreign keys
//! (`Author` → `author_id`). Pluralization rules are regex tables compiled once.

use std::sync::OnceLock;

use regex::Regex;

type Rules = Vec<(Regex, &'static str)>;

const PLURAL_RULES: &[(&str, &str)] = &[
    ("(quiz)$", "${1}zes"),
    ("^(ox)$", "${1}en"),
    ("([ml])ouse$", "${1}ice"),
    ("(matr|vert|ind)(?:ix|ex)$", "${1}ices"),
    ("(x|ch|ss|sh)$", "${1}es"),
    ("([^aeiouy]|qu)y$", "${1}ies"),
    ("(hive)$", "${1}s"),
    ("(?:([^f])fe|([lr])f)$", "${1}${2}ves"),
    ("(shea|lea|loa|thie)f$", "${1}ves"),
    ("sis$", "ses"),
    ("([ti])um$", "${1}a"),
    ("(tomat|potat|ech|her|vet)o$", "${1}oes"),
    ("(bu)s$", "${1}ses"),
    ("(alias|status|campus)$", "${1}es"),
    ("(octop|vir)us$", "${1}i"),
    ("(ax|test)is$", "${1}es"),
    ("s$", "s"),
    ("$", "s"),
];

const SINGULAR_RULES: &[(&str, &str)] = &[
    ("(quiz)zes$", "${1}"),
    ("(matr)ices$", "${1}ix"),
    ("(vert|ind)ices$", "${1}ex"),
    ("^(ox)en", "${1}"),
    ("(alias|status|campus)(es)?$", "${1}"),
    ("(octop|vir)(us|i)$", "${1}us"),
    ("(cris|ax|test)es$", "${1}is"),
    ("(shoe)s$", "${1}"),
    ("(o)es$", "${1}"),
    ("(bus)(es)?$", "${1}"),
    ("([ml])ice$", "${1}ouse"),
    ("(x|ch|ss|sh)es$", "${1}"),
    ("(m)ovies$", "${1}ovie"),
    ("(s)eries$", "${1}eries"),
    ("([^aeiouy]|qu)ies$", "${1}y"),
    ("([lr])ves$", "${1}f"),
    ("(tive)s$", "${1}"),
    ("(hive)s$", "${1}"),
    ("([^f])ves$", "${1}fe"),
    ("(^analy)ses$", "${1}sis"),
    (
        "((a)naly|(b)a|(d)iagno|(p)arenthe|(p)rogno|(s)ynop|(t)he)ses$",
        "${1}sis",
    ),
    ("([ti])a$", "${1}um"),
    ("(n)ews$", "${1}ews"),
    ("(ss)$", "${1}"),
    ("s$", ""),
];

const IRREGULAR: &[(&str, &str)] = &[
    ("person", "people"),
    ("man", "men"),
    ("child", "children"),
    ("sex", "sexes"),
    ("move", "moves"),
    ("foot", "feet"),
    ("tooth", "teeth"),
    ("goose", "geese"),
];

const UNCOUNTABLE: &[&str] = &[
    "sheep",
    "fish",
    "deer",
    "series",
    "species",
    "money",
    "rice",
    "information",
    "equipment",
];

fn compile(table: &[(&str, &'static str)]) -> Rules {
    table
        .iter()
        .filter_map(|(pattern, replacement)| {
            Regex::new(&format!("(?i){pattern}"))
                .ok()
                .map(|re| (re, *replacement))
        })
        .collect()
}

fn plural_rules() -> &'static Rules {
    static RULES: OnceLock<Rules> = OnceLock::new();
    RULES.get_or_init(|| compile(PLURAL_RULES))
}

fn singular_rules() -> &'static Rules {
    static RULES: OnceLock<Rules> = OnceLock::new();
    RULES.get_or_init(|| compile(SINGULAR_RULES))
}

fn match_case(template: &str, word: &str) -> String {
    if template.chars().next().is_some_and(char::is_uppercase) {
        ucfirst(word)
    } else {
        word.to_string()
    }
}

fn inflect(word: &str, rules: &Rules, irregular: impl Fn(&str) -> Option<&'static str>) -> String {
    let lower = word.to_lowercase();
    if word.is_empty() || UNCOUNTABLE.contains(&lower.as_str()) {
        return word.to_string();
    }
    // Irregular words match whole, or as the last segment of a snake/camel compound.
    let mut prev: Option<char> = None;
    for (i, c) in word.char_indices() {
        let boundary = i == 0 || prev == Some('_') || c.is_uppercase();
        prev = Some(c);
        if !boundary {
            continue;
        }
        let tail = &word[i..];
        if let Some(replacement) = irregular(&tail.to_lowercase()) {
            return format!("{}{}", &word[..i], match_case(tail, replacement));
        }
    }
    for (re, replacement) in rules {
        if re.is_match(word) {
            return re.replace(word, *replacement).into_owned();
        }
    }
    word.to_string()
}

/// Plural form of an English word.
pub fn pluralize(word: &str) -> String {
    inflect(word, plural_rules(), |tail| {
        IRREGULAR
            .iter()
            .find(|(singular, _)| *singular == tail)
            .map(|(_, plural)| *plural)
    })
}

/// Singular form of an English word.
pub fn singularize(word: &str) -> String {
    inflect(word, singular_rules(), |tail| {
        IRREGULAR
            .iter()
            .find(|(_, plural)| *plural == tail)
            .map(|(singular, _)| *singular)
    })
}

/// Upper-case the first character.
pub fn ucfirst(s: &str) -> String {
    let mut chars = s.chars();
    match chars.next() {
        Some(first) => first.to_uppercase().chain(chars).collect(),
        None => String::new(),
    }
}

fn lcfirst(s: &str) -> String {
    let mut chars = s.chars();
    match chars.next() {
        Some(first) => first.to_lowercase().chain(chars).collect(),
        None => String::new(),
    }
}

/// Strip any module/namespace qualifier from a class name.
pub fn denamespace(class_name: &str) -> &str {
    let after_colons = class_name.rsplit("::").next().unwrap_or(class_name);
    after_colons.rsplit('\\').next().unwrap_or(after_colons)
}

/// Normalize a raw column name into an attribute name.
pub fn variablize(s: &str) -> String {
    s.trim().to_lowercase().replace(['-', ' '], "_")
}

/// `VenueCB` → `venue_cb`, `BookAuthor` → `book_author`.
pub fn underscore(s: &str) -> String {
    let chars: Vec<char> = s.chars().collect();
    let mut out = String::with_capacity(s.len() + 4);
    for (i, &c) in chars.iter().enumerate() {
        if c.is_uppercase() && i > 0 {
            let prev = chars[i - 1];
            let next_is_lower = chars.get(i + 1).is_some_and(|n| n.is_lowercase());
            if prev.is_lowercase() || prev.is_ascii_digit() || (prev.is_uppercase() && next_is_lower)
            {
                out.push('_');
            }
        }
        out.extend(c.to_lowercase());
    }
    out.replace(['-', ' '], "_")
}

/// `my_name` → `myName`.
pub fn camelize(s: &str) -> String {
    let mut out = String::with_capacity(s.len());
    let mut upper_next = false;
    for c in s.trim().chars() {
        if c == '_' || c == '-' || c == ' ' {
            upper_next = !out.is_empty();
            continue;
        }
        if upper_next {
            out.extend(c.to_uppercase());
            upper_next = false;
        } else {
            out.push(c);
        }
    }
    lcfirst(&out)
}

/// Class name for a table or relationship name: `book_authors` → `BookAuthor`
/// when `singular` is set, `BookAuthors` otherwise.
pub fn classify(s: &str, singular: bool) -> String {
    let camel = camelize(s);
    let camel = if singular { singularize(&camel) } else { camel };
    ucfirst(&camel)
}

/// Default table name for a class: `Author` → `authors`.
pub fn tableize(class_name: &str) -> String {
    pluralize(&underscore(denamespace(class_name)))
}

/// Default foreign key for a class: `Author` → `author_id`.
pub fn keyify(class_name: &str) -> String {
    format!("{}_id", underscore(denamespace(class_name)))
}

/// Human-readable attribute label: `first_name` → `First name`.
pub fn humanize(attribute: &str) -> String {
    ucfirst(&attribute.replace('_', " "))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_pluralize() {
        assert_eq!(pluralize("book"), "books");
        assert_eq!(pluralize("category"), "categories");
        assert_eq!(pluralize("box"), "boxes");
        assert_eq!(pluralize("person"), "people");
        assert_eq!(pluralize("sheep"), "sheep");
        assert_eq!(pluralize("status"), "statuses");
        assert_eq!(pluralize("venue"), "venues");
    }

    #[test]
    fn test_singularize() {
        assert_eq!(singularize("books"), "book");
        assert_eq!(singularize("categories"), "category");
        assert_eq!(singularize("people"), "person");
        assert_eq!(singularize("addresses"), "address");
        assert_eq!(singularize("status"), "status");
        assert_eq!(singularize("hosts"), "host");
    }

    #[test]
    fn test_class_and_key_conventions() {
        assert_eq!(tableize("Author"), "authors");
        assert_eq!(tableize("app::models::BookAuthor"), "book_authors");
        assert_eq!(keyify("Author"), "author_id");
        assert_eq!(keyify("VenueCB"), "venue_cb_id");
        assert_eq!(classify("books", true), "Book");
        assert_eq!(classify("book_authors", true), "BookAuthor");
        assert_eq!(classify("author", false), "Author");
    }

    #[test]
    fn test_camelize_and_humanize() {
        assert_eq!(camelize("my_name"), "myName");
        assert_eq!(camelize("Author"), "author");
        assert_eq!(humanize("first_name"), "First name");
        assert_eq!(variablize(" First-Name "), "first_name");
    }
}
