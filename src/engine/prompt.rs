use std::collections::BTreeMap;

pub const UNSET: &str = "<unset>";

/// Fills `{name}` placeholders from `vars`. Unknown names render as `<unset>`,
/// an unclosed brace is kept as is.
pub fn render(template: &str, vars: &BTreeMap<String, String>) -> String {
    let mut out = String::with_capacity(template.len());
    let mut rest = template;

    while let Some(open) = rest.find('{') {
        out.push_str(&rest[..open]);
        let after = &rest[open + 1..];
        match after.find('}') {
            Some(close) => {
                let key = &after[..close];
                out.push_str(vars.get(key).map(String::as_str).unwrap_or(UNSET));
                rest = &after[close + 1..];
            }
            None => {
                out.push_str(&rest[open..]);
                rest = "";
            }
        }
    }
    out.push_str(rest);
    out
}
