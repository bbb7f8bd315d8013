use std::collections::BTreeMap;

use crate::job::Job;

pub const LABEL_APP_TYPE: &str = "app-type";
pub const LABEL_EXTERNAL_ID: &str = "external-id";
pub const LABEL_USER_ID: &str = "user-id";
pub const LABEL_USERNAME: &str = "username";
pub const LABEL_ANALYSIS_NAME: &str = "analysis-name";
pub const LABEL_APP_NAME: &str = "app-name";
pub const LABEL_APP_ID: &str = "app-id";
pub const LABEL_ANALYSIS_ID: &str = "analysis-id";
pub const LABEL_SUBDOMAIN: &str = "subdomain";
pub const LABEL_LOGIN_IP: &str = "login-ip";
pub const LABEL_VOLUME_NAME: &str = "volume-name";

pub const APP_TYPE_INTERACTIVE: &str = "interactive";

/// The base label set stamped onto every object an analysis owns.
/// `login-ip` and `analysis-id` need the Apps service and are filled in
/// lazily, either at launch or by the label sweep.
pub fn labels_from_job(job: &Job) -> BTreeMap<String, String> {
    let mut labels = BTreeMap::new();
    labels.insert(LABEL_APP_TYPE.into(), APP_TYPE_INTERACTIVE.into());
    labels.insert(LABEL_EXTERNAL_ID.into(), job.invocation_id.clone());
    labels.insert(LABEL_USER_ID.into(), job.user_id.clone());
    labels.insert(LABEL_USERNAME.into(), label_value_string(&job.submitter));
    labels.insert(LABEL_ANALYSIS_NAME.into(), label_value_string(&job.name));
    labels.insert(LABEL_APP_NAME.into(), label_value_string(&job.app_name));
    labels.insert(LABEL_APP_ID.into(), job.app_id.clone());
    labels.insert(
        LABEL_SUBDOMAIN.into(),
        crate::name::ingress_name(&job.user_id, &job.invocation_id),
    );
    labels
}

/// Appends the configured suffix to usernames that lack it, so lookups
/// against the Apps service use the fully-qualified form.
pub fn fix_username(username: &str, suffix: &str) -> String {
    if suffix.is_empty() || username.ends_with(suffix) {
        username.to_string()
    } else {
        format!("{username}{suffix}")
    }
}

/// Maps an arbitrary string onto the restricted label-value alphabet.
///
/// Leading and trailing runs of non-alphanumeric characters are replaced by
/// marker sequences (`_` -> `u`, `-` -> `h`, anything else -> `x` plus the
/// code point in hex) joined with `-` and separated from the untouched core
/// by the literal `-xxx-`. Interior runs of `-` collapse to a single `-`.
pub fn label_value_string(value: &str) -> String {
    let chars: Vec<char> = value.chars().collect();
    let start = chars.iter().position(|c| c.is_ascii_alphanumeric());
    let end = chars.iter().rposition(|c| c.is_ascii_alphanumeric());

    let (start, end) = match (start, end) {
        (Some(start), Some(end)) => (start, end),
        // nothing but marker characters
        _ => return encode_run(&chars),
    };

    let mut out = String::new();
    if start > 0 {
        out.push_str(&encode_run(&chars[..start]));
        out.push_str(SEPARATOR);
    }

    let mut previous_dash = false;
    for c in &chars[start..=end] {
        let dash = *c == '-';
        if !(dash && previous_dash) {
            out.push(*c);
        }
        previous_dash = dash;
    }

    if end + 1 < chars.len() {
        out.push_str(SEPARATOR);
        out.push_str(&encode_run(&chars[end + 1..]));
    }
    out
}

fn encode_run(run: &[char]) -> String {
    run.iter()
        .map(|c| match c {
            '_' => "u".to_string(),
            '-' => "h".to_string(),
            c => format!("x{:x}", *c as u32),
        })
        .collect::<Vec<_>>()
        .join("-")
}

const SEPARATOR: &str = "-xxx-";

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn label_value_replacement() {
        assert_eq!(label_value_string("foo_"), "foo-xxx-u");
        assert_eq!(label_value_string("foo__"), "foo-xxx-u-u");
        assert_eq!(label_value_string("foo_-_"), "foo-xxx-u-h-u");
        assert_eq!(label_value_string("-foo"), "h-xxx-foo");
        assert_eq!(label_value_string("-_-foo"), "h-u-h-xxx-foo");
        assert_eq!(
            label_value_string("-_-foo-bar-_-"),
            "h-u-h-xxx-foo-bar-xxx-h-u-h"
        );
        assert_eq!(
            label_value_string("___foo_bar___"),
            "u-u-u-xxx-foo_bar-xxx-u-u-u"
        );
        assert_eq!(
            label_value_string("____foo__bar--baz__quux____"),
            "u-u-u-u-xxx-foo__bar-baz__quux-xxx-u-u-u-u"
        );
    }

    #[test]
    fn label_value_passthrough() {
        assert_eq!(label_value_string("plain"), "plain");
        assert_eq!(label_value_string("snake_case_mid"), "snake_case_mid");
    }

    #[test]
    fn fix_username_suffix() {
        assert_eq!(fix_username("alice", "@cyverse.org"), "alice@cyverse.org");
        assert_eq!(
            fix_username("alice@cyverse.org", "@cyverse.org"),
            "alice@cyverse.org"
        );
        assert_eq!(fix_username("alice", ""), "alice");
    }
}
