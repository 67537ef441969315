use std::collections::BTreeMap;

use super::domain::Lead;

/// Substitute `{{key}}` placeholders in a step template.
///
/// Unresolved placeholders render as the empty string; rendering never
/// fails. An unterminated `{{` is emitted literally.
pub fn render_template(template: &str, vars: &BTreeMap<String, String>) -> String {
    let mut output = String::with_capacity(template.len());
    let mut rest = template;

    while let Some(start) = rest.find("{{") {
        output.push_str(&rest[..start]);
        let after = &rest[start + 2..];
        match after.find("}}") {
            Some(end) => {
                let key = after[..end].trim();
                if let Some(value) = vars.get(key) {
                    output.push_str(value);
                }
                rest = &after[end + 2..];
            }
            None => {
                output.push_str(&rest[start..]);
                return output;
            }
        }
    }

    output.push_str(rest);
    output
}

/// Standard substitution variables derived from a lead.
pub fn lead_vars(lead: &Lead) -> BTreeMap<String, String> {
    let mut vars = BTreeMap::new();
    vars.insert("first_name".to_string(), lead.first_name.clone());
    vars.insert("last_name".to_string(), lead.last_name.clone());
    vars.insert("company".to_string(), lead.company.clone());
    vars.insert("email".to_string(), lead.email.clone());
    vars.insert(
        "full_name".to_string(),
        format!("{} {}", lead.first_name, lead.last_name)
            .trim()
            .to_string(),
    );
    vars
}
