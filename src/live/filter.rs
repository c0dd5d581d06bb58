use std::sync::Arc;

use crate::core::{DbError, Result, Value};
use crate::store::{DynamicView, FilterValue, Find, FindValue, Pattern, WhereFn};

/// How a text input maps onto a filter value.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum InputType {
    #[default]
    String,
    Number,
    Boolean,
    Regexp,
}

/// Options for regexp-typed inputs: the fixed pattern text wrapped around
/// the user's value.
#[derive(Clone)]
pub struct FilterOptions {
    pub prefix: String,
    pub postfix: String,
    pub ignore_case: bool,
}

impl Default for FilterOptions {
    fn default() -> Self {
        Self {
            prefix: String::new(),
            postfix: String::new(),
            ignore_case: true,
        }
    }
}

/// Pattern source back to the text the user typed: the fixed prefix and
/// postfix are stripped off. A pattern that was not produced by
/// [`string_to_regexp`] with the same wrapping comes back whole.
pub fn regexp_to_string(pattern: &Pattern, prefix: &str, postfix: &str) -> String {
    let source = pattern.source();
    let trimmed = source.strip_prefix(prefix).unwrap_or(source);
    trimmed.strip_suffix(postfix).unwrap_or(trimmed).to_string()
}

/// Wrap the typed text in the fixed prefix/postfix and compile it. The
/// text is taken as regex syntax, so invalid syntax is a `PatternSyntax`
/// error for the caller to surface.
pub fn string_to_regexp(
    value: &str,
    prefix: &str,
    postfix: &str,
    ignore_case: bool,
) -> Result<Pattern> {
    Pattern::new(&format!("{}{}{}", prefix, value, postfix), ignore_case)
}

/// Render a filter value as input text.
pub fn filter_to_input(value: &FindValue, ty: InputType, options: &FilterOptions) -> String {
    match (ty, value) {
        (InputType::Regexp, FindValue::Regex(pattern)) => {
            regexp_to_string(pattern, &options.prefix, &options.postfix)
        }
        (_, FindValue::Value(Value::Null)) => String::new(),
        (_, FindValue::Value(v)) => v.to_string(),
        _ => String::new(),
    }
}

/// Parse input text into a filter value according to its type.
pub fn input_to_filter(text: &str, ty: InputType, options: &FilterOptions) -> Result<FindValue> {
    match ty {
        InputType::String => Ok(FindValue::Value(Value::Text(text.to_string()))),
        InputType::Number => Ok(FindValue::Value(Value::Float(
            text.parse::<f64>().unwrap_or(f64::NAN),
        ))),
        InputType::Boolean => Ok(FindValue::Value(Value::Boolean(!text.is_empty()))),
        InputType::Regexp => Ok(FindValue::Regex(string_to_regexp(
            text,
            &options.prefix,
            &options.postfix,
            options.ignore_case,
        )?)),
    }
}

/// Handle on one uid-named filter slot of a view.
pub struct FilterSlot {
    view: Arc<DynamicView>,
    uid: String,
}

impl FilterSlot {
    pub fn new(view: Arc<DynamicView>, uid: &str) -> Self {
        Self {
            view,
            uid: uid.to_string(),
        }
    }

    pub fn uid(&self) -> &str {
        &self.uid
    }

    pub fn get(&self) -> Option<FilterValue> {
        self.view.get_filter_value(&self.uid)
    }

    /// Replace the slot's filter; `None` clears the slot.
    pub fn set(&self, value: Option<FilterValue>) {
        match value {
            Some(FilterValue::Find(find)) => self.view.apply_find(&self.uid, find),
            Some(FilterValue::Where(predicate)) => self.view.apply_where(&self.uid, predicate),
            None => {
                self.view.remove_filter(&self.uid);
            }
        }
    }

    pub fn set_where(&self, predicate: WhereFn) {
        self.set(Some(FilterValue::Where(predicate)));
    }

    pub fn clear(&self) {
        self.set(None);
    }
}

/// A text input bound to one path inside a slot's find query.
///
/// `set_value` always records the typed text, but only a successfully
/// parsed value reaches the view; on a parse error the previous filter
/// keeps working and the error is held for display next to the input.
pub struct FilterBinding {
    slot: FilterSlot,
    path: Vec<String>,
    ty: InputType,
    options: FilterOptions,
    value: String,
    error: Option<DbError>,
}

impl FilterBinding {
    pub fn new(
        view: Arc<DynamicView>,
        uid: &str,
        path: &[&str],
        ty: InputType,
        options: FilterOptions,
    ) -> Self {
        let slot = FilterSlot::new(view, uid);
        let value = match slot.get() {
            Some(FilterValue::Find(find)) => find
                .get_path(path)
                .map(|current| filter_to_input(current, ty, &options))
                .unwrap_or_default(),
            _ => String::new(),
        };
        Self {
            slot,
            path: path.iter().map(|s| s.to_string()).collect(),
            ty,
            options,
            value,
            error: None,
        }
    }

    /// The text as typed, whether or not it parsed.
    pub fn value(&self) -> &str {
        &self.value
    }

    pub fn error(&self) -> Option<&DbError> {
        self.error.as_ref()
    }

    pub fn set_value(&mut self, text: &str) {
        self.value = text.to_string();
        let path: Vec<&str> = self.path.iter().map(String::as_str).collect();
        match input_to_filter(text, self.ty, &self.options) {
            Ok(parsed) => {
                let mut find = match self.slot.get() {
                    Some(FilterValue::Find(find)) => find,
                    _ => Find::new(),
                };
                find.set_path(&path, parsed);
                self.slot.set(Some(FilterValue::Find(find)));
                self.error = None;
            }
            Err(error) => {
                self.error = Some(error);
            }
        }
    }

    /// Clear the whole slot and the input.
    pub fn clear(&mut self) {
        self.value.clear();
        self.error = None;
        self.slot.clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fields;
    use crate::store::{Collection, CollectionOptions, ViewOptions};

    fn wrap(prefix: &str, postfix: &str) -> FilterOptions {
        FilterOptions {
            prefix: prefix.to_string(),
            postfix: postfix.to_string(),
            ignore_case: true,
        }
    }

    #[test]
    fn test_regexp_text_round_trip() {
        let options = wrap("a", "c");
        let pattern = string_to_regexp("b", "a", "c", true).unwrap();
        assert_eq!(pattern.source(), "abc");
        assert_eq!(regexp_to_string(&pattern, "a", "c"), "b");

        let rendered = filter_to_input(&FindValue::Regex(pattern), InputType::Regexp, &options);
        assert_eq!(rendered, "b");
    }

    #[test]
    fn test_foreign_pattern_renders_whole() {
        let pattern = Pattern::new("xyz", false).unwrap();
        assert_eq!(regexp_to_string(&pattern, "a", "c"), "xyz");
    }

    #[test]
    fn test_number_parses_like_a_form_field() {
        let options = FilterOptions::default();
        let parsed = input_to_filter("30", InputType::Number, &options).unwrap();
        assert_eq!(parsed, FindValue::Value(Value::Float(30.0)));
        assert_eq!(filter_to_input(&parsed, InputType::Number, &options), "30");

        let bogus = input_to_filter("thirty", InputType::Number, &options).unwrap();
        let FindValue::Value(Value::Float(f)) = bogus else {
            panic!("expected a float");
        };
        assert!(f.is_nan());
    }

    fn view_with_docs() -> (Arc<Collection>, Arc<DynamicView>) {
        let collection = Collection::new("cities", CollectionOptions::default());
        collection
            .insert_many(vec![
                fields! { "name" => "Berlin" },
                fields! { "name" => "Bern" },
                fields! { "name" => "Madrid" },
            ])
            .unwrap();
        let view = collection.ensure_dynamic_view("search", ViewOptions::default());
        (collection, view)
    }

    #[test]
    fn test_binding_drives_view() {
        let (_collection, view) = view_with_docs();
        let mut binding = FilterBinding::new(
            Arc::clone(&view),
            "name-input",
            &["name"],
            InputType::Regexp,
            wrap("^", ""),
        );
        assert_eq!(binding.value(), "");

        binding.set_value("ber");
        assert!(binding.error().is_none());
        assert_eq!(view.data().len(), 2);

        binding.set_value("bern");
        assert_eq!(view.data().len(), 1);

        binding.clear();
        assert_eq!(view.data().len(), 3);
        assert_eq!(binding.value(), "");
    }

    #[test]
    fn test_parse_error_keeps_last_good_filter() {
        let (_collection, view) = view_with_docs();
        let mut binding = FilterBinding::new(
            Arc::clone(&view),
            "name-input",
            &["name"],
            InputType::Regexp,
            FilterOptions::default(),
        );

        binding.set_value("ber");
        assert_eq!(view.data().len(), 2);

        binding.set_value("ber(");
        assert!(matches!(binding.error(), Some(DbError::PatternSyntax(_))));
        // the typed text is kept for the input, the view keeps filtering
        assert_eq!(binding.value(), "ber(");
        assert_eq!(view.data().len(), 2);

        binding.set_value("madrid");
        assert!(binding.error().is_none());
        assert_eq!(view.data().len(), 1);
    }

    #[test]
    fn test_binding_picks_up_existing_filter() {
        let (_collection, view) = view_with_docs();
        view.apply_find(
            "name-input",
            Find::new().regex("name", Pattern::new("^ber", true).unwrap()),
        );
        let binding = FilterBinding::new(
            Arc::clone(&view),
            "name-input",
            &["name"],
            InputType::Regexp,
            wrap("^", ""),
        );
        assert_eq!(binding.value(), "ber");
    }

    #[test]
    fn test_operator_path_binding() {
        let collection = Collection::new("items", CollectionOptions::default());
        collection
            .insert_many(vec![
                fields! { "price" => 5.0 },
                fields! { "price" => 25.0 },
                fields! { "price" => 50.0 },
            ])
            .unwrap();
        let view = collection.ensure_dynamic_view("pricey", ViewOptions::default());

        let mut binding = FilterBinding::new(
            Arc::clone(&view),
            "price-min",
            &["price", "$gte"],
            InputType::Number,
            FilterOptions::default(),
        );
        binding.set_value("20");
        assert_eq!(view.data().len(), 2);
        binding.set_value("30");
        assert_eq!(view.data().len(), 1);
    }

    #[test]
    fn test_slot_where_filter() {
        let (_collection, view) = view_with_docs();
        let slot = FilterSlot::new(Arc::clone(&view), "fn");
        slot.set_where(Arc::new(|doc| {
            matches!(doc.get("name"), Some(Value::Text(name)) if name.len() == 4)
        }));
        assert_eq!(view.data().len(), 1);
        assert!(matches!(slot.get(), Some(FilterValue::Where(_))));

        slot.clear();
        assert_eq!(view.data().len(), 3);
        assert!(slot.get().is_none());
    }
}
