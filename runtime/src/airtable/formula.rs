//! Builders for Airtable `filterByFormula` expressions.

pub fn field_equals(field: &str, value: &str) -> String {
    format!("{{{}}} = '{}'", field_name(field), escape_literal(value))
}

pub fn and(clauses: &[String]) -> String {
    combine("AND", clauses)
}

fn combine(op: &str, clauses: &[String]) -> String {
    match clauses {
        [] => String::new(),
        [single] => single.clone(),
        many => format!("{op}({})", many.join(", ")),
    }
}

fn field_name(field: &str) -> String {
    field.replace(['{', '}'], "")
}

fn escape_literal(value: &str) -> String {
    value.replace('\\', "\\\\").replace('\'', "\\'")
}
