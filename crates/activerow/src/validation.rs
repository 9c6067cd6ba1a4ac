//! Declarative validators.
//!
//! A [`Validation`] is declared on a [`ModelConfig`](crate::ModelConfig) and
//! evaluated against the record's current attribute values every time the
//! record is validated. Failures are collected into [`Errors`]; only
//! misdeclared validators (bad length ranges, missing format patterns) are
//! reported as [`Error::ValidationsArgument`].

use activerow_core::{Error, Result, Value, is_integer_literal, is_numeric, matches_pattern};
use activerow_query::{Conditions, FindOptions};

use crate::errors::{Errors, default_message};
use crate::record::Record;

/// Numeric comparisons, evaluated in declaration-independent fixed order.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct NumericalityOptions {
    pub only_integer: bool,
    pub greater_than: Option<f64>,
    pub greater_than_or_equal_to: Option<f64>,
    pub equal_to: Option<f64>,
    pub less_than: Option<f64>,
    pub less_than_or_equal_to: Option<f64>,
    pub odd: bool,
    pub even: bool,
}

/// Length bounds. Exactly one of `is`, `within`, `in_range`, `minimum` and
/// `maximum` must be set.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LengthOptions {
    pub is: Option<i64>,
    pub within: Option<(i64, i64)>,
    pub in_range: Option<(i64, i64)>,
    pub minimum: Option<i64>,
    pub maximum: Option<i64>,
    pub too_long: String,
    pub too_short: String,
    pub wrong_length: String,
}

impl Default for LengthOptions {
    fn default() -> Self {
        Self {
            is: None,
            within: None,
            in_range: None,
            minimum: None,
            maximum: None,
            too_long: default_message("too_long").to_string(),
            too_short: default_message("too_short").to_string(),
            wrong_length: default_message("wrong_length").to_string(),
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum ValidationKind {
    Presence,
    Inclusion(Vec<Value>),
    Exclusion(Vec<Value>),
    Format(Option<String>),
    Numericality(NumericalityOptions),
    Length(LengthOptions),
    /// The attributes must be unique jointly.
    Uniqueness,
}

/// One validator applied to one or more attributes.
#[derive(Debug, Clone, PartialEq)]
pub struct Validation {
    pub kind: ValidationKind,
    pub attributes: Vec<String>,
    pub allow_null: bool,
    pub allow_blank: bool,
    pub message: Option<String>,
}

fn names<I, S>(attributes: I) -> Vec<String>
where
    I: IntoIterator<Item = S>,
    S: Into<String>,
{
    attributes.into_iter().map(Into::into).collect()
}

impl Validation {
    fn new(kind: ValidationKind, attributes: Vec<String>) -> Self {
        Self {
            kind,
            attributes,
            allow_null: false,
            allow_blank: false,
            message: None,
        }
    }

    /// The attribute must not be null or `""`.
    pub fn presence_of<I, S>(attributes: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self::new(ValidationKind::Presence, names(attributes))
    }

    /// The attribute must be one of `values`.
    pub fn inclusion_of<I, S>(attributes: I, values: Vec<Value>) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self::new(ValidationKind::Inclusion(values), names(attributes))
    }

    /// The attribute must not be one of `values`.
    pub fn exclusion_of<I, S>(attributes: I, values: Vec<Value>) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self::new(ValidationKind::Exclusion(values), names(attributes))
    }

    /// The attribute must match the pattern given with [`Validation::with`].
    pub fn format_of<I, S>(attributes: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self::new(ValidationKind::Format(None), names(attributes))
    }

    pub fn numericality_of<I, S>(attributes: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self::new(
            ValidationKind::Numericality(NumericalityOptions::default()),
            names(attributes),
        )
    }

    pub fn length_of<I, S>(attributes: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self::new(ValidationKind::Length(LengthOptions::default()), names(attributes))
    }

    /// Alias of [`Validation::length_of`].
    pub fn size_of<I, S>(attributes: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self::length_of(attributes)
    }

    /// No other row may share the values of `fields` (taken together).
    pub fn uniqueness_of<I, S>(fields: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self::new(ValidationKind::Uniqueness, names(fields))
    }

    #[must_use]
    pub fn allow_null(mut self, allow: bool) -> Self {
        self.allow_null = allow;
        self
    }

    #[must_use]
    pub fn allow_blank(mut self, allow: bool) -> Self {
        self.allow_blank = allow;
        self
    }

    /// Replace the default message. `%s` (inclusion/exclusion) and `%d`
    /// (numericality/length) are substituted.
    #[must_use]
    pub fn message(mut self, message: impl Into<String>) -> Self {
        self.message = Some(message.into());
        self
    }

    /// Pattern for a format validator.
    #[must_use]
    pub fn with(mut self, pattern: impl Into<String>) -> Self {
        if let ValidationKind::Format(with) = &mut self.kind {
            *with = Some(pattern.into());
        }
        self
    }

    fn numericality(mut self, f: impl FnOnce(&mut NumericalityOptions)) -> Self {
        if let ValidationKind::Numericality(opts) = &mut self.kind {
            f(opts);
        }
        self
    }

    fn length(mut self, f: impl FnOnce(&mut LengthOptions)) -> Self {
        if let ValidationKind::Length(opts) = &mut self.kind {
            f(opts);
        }
        self
    }

    #[must_use]
    pub fn only_integer(self) -> Self {
        self.numericality(|o| o.only_integer = true)
    }

    #[must_use]
    pub fn greater_than(self, n: f64) -> Self {
        self.numericality(|o| o.greater_than = Some(n))
    }

    #[must_use]
    pub fn greater_than_or_equal_to(self, n: f64) -> Self {
        self.numericality(|o| o.greater_than_or_equal_to = Some(n))
    }

    #[must_use]
    pub fn equal_to(self, n: f64) -> Self {
        self.numericality(|o| o.equal_to = Some(n))
    }

    #[must_use]
    pub fn less_than(self, n: f64) -> Self {
        self.numericality(|o| o.less_than = Some(n))
    }

    #[must_use]
    pub fn less_than_or_equal_to(self, n: f64) -> Self {
        self.numericality(|o| o.less_than_or_equal_to = Some(n))
    }

    #[must_use]
    pub fn odd(self) -> Self {
        self.numericality(|o| o.odd = true)
    }

    #[must_use]
    pub fn even(self) -> Self {
        self.numericality(|o| o.even = true)
    }

    #[must_use]
    pub fn is(self, n: i64) -> Self {
        self.length(|o| o.is = Some(n))
    }

    #[must_use]
    pub fn within(self, min: i64, max: i64) -> Self {
        self.length(|o| o.within = Some((min, max)))
    }

    #[must_use]
    pub fn in_range(self, min: i64, max: i64) -> Self {
        self.length(|o| o.in_range = Some((min, max)))
    }

    #[must_use]
    pub fn minimum(self, n: i64) -> Self {
        self.length(|o| o.minimum = Some(n))
    }

    #[must_use]
    pub fn maximum(self, n: i64) -> Self {
        self.length(|o| o.maximum = Some(n))
    }

    #[must_use]
    pub fn too_long(self, message: impl Into<String>) -> Self {
        let message = message.into();
        self.length(|o| o.too_long = message)
    }

    #[must_use]
    pub fn too_short(self, message: impl Into<String>) -> Self {
        let message = message.into();
        self.length(|o| o.too_short = message)
    }

    #[must_use]
    pub fn wrong_length(self, message: impl Into<String>) -> Self {
        let message = message.into();
        self.length(|o| o.wrong_length = message)
    }

    fn skips(&self, value: &Value) -> bool {
        (self.allow_null && value.is_null()) || (self.allow_blank && value.is_blank())
    }

    /// Evaluate against `record`, recording failures in `errors`.
    pub(crate) fn evaluate(&self, record: &mut Record, errors: &mut Errors) -> Result<()> {
        match &self.kind {
            ValidationKind::Presence => {
                let message = self.message.as_deref().unwrap_or(default_message("blank"));
                for attr in &self.attributes {
                    let value = record.get(attr)?;
                    errors.add_on_blank(attr, &value, Some(message));
                }
            }
            ValidationKind::Inclusion(values) | ValidationKind::Exclusion(values) => {
                let inclusion = matches!(self.kind, ValidationKind::Inclusion(_));
                let template = self.message.as_deref().unwrap_or(default_message(if inclusion {
                    "inclusion"
                } else {
                    "exclusion"
                }));
                for attr in &self.attributes {
                    let value = record.get(attr)?;
                    if self.skips(&value) {
                        continue;
                    }
                    let found = values.iter().any(|v| loose_eq(v, &value));
                    if found != inclusion {
                        errors.add(attr, Some(&template.replace("%s", &value.to_string())));
                    }
                }
            }
            ValidationKind::Format(pattern) => {
                let Some(pattern) = pattern else {
                    return Err(Error::ValidationsArgument(
                        "A regular expression must be supplied as the [with] option of the configuration array."
                            .to_string(),
                    ));
                };
                let message = self.message.as_deref().unwrap_or(default_message("invalid"));
                for attr in &self.attributes {
                    let value = record.get(attr)?;
                    if self.skips(&value) {
                        continue;
                    }
                    if !matches_pattern(&value.to_string(), pattern) {
                        errors.add(attr, Some(message));
                    }
                }
            }
            ValidationKind::Numericality(opts) => {
                for attr in &self.attributes {
                    let value = record.get(attr)?;
                    if self.allow_null && value.is_null() {
                        continue;
                    }
                    self.check_numericality(attr, &value, opts, errors);
                }
            }
            ValidationKind::Length(opts) => {
                let bounds = length_bounds(opts)?;
                for attr in &self.attributes {
                    let value = record.get(attr)?;
                    if self.skips(&value) {
                        continue;
                    }
                    self.check_length(attr, &value, opts, &bounds, errors);
                }
            }
            ValidationKind::Uniqueness => self.check_uniqueness(record, errors)?,
        }
        Ok(())
    }

    fn check_numericality(
        &self,
        attr: &str,
        value: &Value,
        opts: &NumericalityOptions,
        errors: &mut Errors,
    ) {
        let not_a_number = self.message.as_deref().unwrap_or(default_message("not_a_number"));
        let number = if opts.only_integer && !matches!(value, Value::Int(_)) {
            if !is_integer_literal(&value.to_string()) {
                errors.add(attr, Some(not_a_number));
                return;
            }
            value.as_f64().unwrap_or_default()
        } else {
            let numeric = match value {
                Value::Int(_) | Value::Double(_) => value.as_f64(),
                Value::Text(s) if is_numeric(s) => value.as_f64(),
                _ => None,
            };
            let Some(number) = numeric else {
                errors.add(attr, Some(not_a_number));
                return;
            };
            number
        };

        let comparisons: [(&str, Option<f64>, fn(f64, f64) -> bool); 5] = [
            ("greater_than", opts.greater_than, |v, o| v > o),
            ("greater_than_or_equal_to", opts.greater_than_or_equal_to, |v, o| v >= o),
            ("equal_to", opts.equal_to, |v, o| (v - o).abs() < f64::EPSILON),
            ("less_than", opts.less_than, |v, o| v < o),
            ("less_than_or_equal_to", opts.less_than_or_equal_to, |v, o| v <= o),
        ];
        for (key, bound, passes) in comparisons {
            let Some(bound) = bound else { continue };
            if !passes(number, bound) {
                let template = self.message.as_deref().unwrap_or(default_message(key));
                errors.add(attr, Some(&template.replace("%d", &format_number(bound))));
            }
        }

        #[allow(clippy::cast_possible_truncation)]
        let is_odd = (number.trunc() as i64) & 1 == 1;
        if opts.odd && !is_odd {
            errors.add(attr, Some(self.message.as_deref().unwrap_or(default_message("odd"))));
        }
        if opts.even && is_odd {
            errors.add(attr, Some(self.message.as_deref().unwrap_or(default_message("even"))));
        }
    }

    fn check_length(
        &self,
        attr: &str,
        value: &Value,
        opts: &LengthOptions,
        bounds: &[(&'static str, i64)],
        errors: &mut Errors,
    ) {
        let len = i64::try_from(value.to_string().chars().count()).unwrap_or(i64::MAX);
        for (option, bound) in bounds {
            if *option == "maximum" && value.is_null() {
                continue;
            }
            let template = self.message.as_deref().unwrap_or(match *option {
                "is" => opts.wrong_length.as_str(),
                "minimum" => opts.too_short.as_str(),
                _ => opts.too_long.as_str(),
            });
            let failed = match *option {
                "maximum" => len > *bound,
                "minimum" => len < *bound,
                _ => len != *bound,
            };
            if failed {
                errors.add(attr, Some(&template.replace("%d", &bound.to_string())));
            }
        }
    }

    fn check_uniqueness(&self, record: &mut Record, errors: &mut Errors) -> Result<()> {
        let pk = record.table().pk.first().cloned().unwrap_or_default();
        let pk_value = record.attributes().get(&pk).cloned().unwrap_or_default();

        let mut values = Vec::new();
        let mut sql = if pk_value.is_null() {
            format!("{pk} is not null")
        } else {
            values.push(pk_value);
            format!("{pk}!=?")
        };
        for field in &self.attributes {
            let real = record.real_attribute_name(field).unwrap_or_else(|| field.clone());
            sql.push_str(&format!(" and {real}=?"));
            values.push(record.get(&real)?);
        }

        let options = FindOptions::new().conditions(Conditions::sql_with(sql, values));
        if record.model().exists(options)? {
            let message = self.message.as_deref().unwrap_or(default_message("unique"));
            errors.add(&self.attributes.join("_and_"), Some(message));
        }
        Ok(())
    }
}

/// Resolve the single range option into `(option, bound)` checks.
fn length_bounds(opts: &LengthOptions) -> Result<Vec<(&'static str, i64)>> {
    let specified = [
        opts.in_range.is_some(),
        opts.is.is_some(),
        opts.maximum.is_some(),
        opts.minimum.is_some(),
        opts.within.is_some(),
    ]
    .into_iter()
    .filter(|set| *set)
    .count();
    match specified {
        0 => {
            return Err(Error::ValidationsArgument(
                "Range unspecified.  Specify the [within], [maximum], or [is] option.".to_string(),
            ));
        }
        1 => {}
        _ => {
            return Err(Error::ValidationsArgument(
                "Too many range options specified.  Choose only one.".to_string(),
            ));
        }
    }

    let bounds = if let Some(((min, max), option)) = opts
        .within
        .map(|r| (r, "within"))
        .or_else(|| opts.in_range.map(|r| (r, "in")))
    {
        if min >= max {
            return Err(Error::ValidationsArgument(format!(
                "{option} must be an array composing a range of numbers with key [0] being less than key [1]"
            )));
        }
        vec![("minimum", min), ("maximum", max)]
    } else if let Some(n) = opts.is {
        vec![("is", n)]
    } else if let Some(n) = opts.minimum {
        vec![("minimum", n)]
    } else {
        vec![("maximum", opts.maximum.unwrap_or_default())]
    };

    for (option, bound) in &bounds {
        if *bound <= 0 {
            return Err(Error::ValidationsArgument(format!(
                "{option} value cannot use a signed integer."
            )));
        }
    }
    Ok(bounds)
}

/// Equality that treats `1`, `1.0` and `"1"` alike.
fn loose_eq(a: &Value, b: &Value) -> bool {
    if a == b {
        return true;
    }
    match (a.as_f64(), b.as_f64()) {
        (Some(x), Some(y)) if !matches!((a, b), (Value::Text(_), Value::Text(_))) => {
            (x - y).abs() < f64::EPSILON
        }
        _ => false,
    }
}

fn format_number(n: f64) -> String {
    if n.fract() == 0.0 && n.abs() < 1e15 {
        #[allow(clippy::cast_possible_truncation)]
        let whole = n as i64;
        whole.to_string()
    } else {
        n.to_string()
    }
}

/// Run every declared validator against `record`.
pub(crate) fn run(record: &mut Record, validations: &[Validation]) -> Result<Errors> {
    let mut errors = Errors::new();
    for validation in validations {
        validation.evaluate(record, &mut errors)?;
    }
    Ok(errors)
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn test_length_requires_exactly_one_range_option() {
        let none = LengthOptions::default();
        assert_eq!(
            length_bounds(&none).unwrap_err(),
            Error::ValidationsArgument(
                "Range unspecified.  Specify the [within], [maximum], or [is] option.".into()
            )
        );

        let Validation {
            kind: ValidationKind::Length(both),
            ..
        } = Validation::length_of(["name"]).within(1, 5).is(3)
        else {
            unreachable!()
        };
        assert_eq!(
            length_bounds(&both).unwrap_err(),
            Error::ValidationsArgument("Too many range options specified.  Choose only one.".into())
        );
    }

    #[test]
    fn test_length_bounds_expand_ranges() {
        let opts = LengthOptions {
            within: Some((2, 8)),
            ..LengthOptions::default()
        };
        assert_eq!(length_bounds(&opts).unwrap(), vec![("minimum", 2), ("maximum", 8)]);
    }

    #[test]
    fn test_length_bounds_reject_non_positive_values() {
        let opts = LengthOptions {
            maximum: Some(0),
            ..LengthOptions::default()
        };
        assert_eq!(
            length_bounds(&opts).unwrap_err(),
            Error::ValidationsArgument("maximum value cannot use a signed integer.".into())
        );
        let inverted = LengthOptions {
            in_range: Some((5, 2)),
            ..LengthOptions::default()
        };
        assert!(length_bounds(&inverted).is_err());
    }

    #[test]
    fn test_builder_ignores_options_for_other_kinds() {
        let v = Validation::presence_of(["name"]).greater_than(3.0).within(1, 2);
        assert_eq!(v.kind, ValidationKind::Presence);
        let n = Validation::numericality_of(["price"]).only_integer().greater_than(0.0);
        let ValidationKind::Numericality(opts) = n.kind else {
            unreachable!()
        };
        assert!(opts.only_integer);
        assert_eq!(opts.greater_than, Some(0.0));
    }

    #[test]
    fn test_loose_eq() {
        assert!(loose_eq(&Value::Int(1), &Value::from("1")));
        assert!(loose_eq(&Value::Double(2.0), &Value::Int(2)));
        assert!(!loose_eq(&Value::from("1.0"), &Value::from("1")));
        assert!(!loose_eq(&Value::from("a"), &Value::from("b")));
    }

    #[test]
    fn test_format_number() {
        assert_eq!(format_number(5.0), "5");
        assert_eq!(format_number(2.5), "2.5");
    }
}
