//! Instance object paths: `[namespace:]Class.Key1='v1',Key2='v2'` or the
//! singleton form `[namespace:]Class=@`.
//!
//! [`ObjectPath`] builds and parses the path forms that
//! `IWbemServices::DeleteInstance` accepts.  The service stays the authority
//! on what a valid path is -- [`crate::ServiceHandle::delete_path`] takes any
//! string -- but building paths through this type gets quoting right.

use std::fmt;
use std::str::FromStr;

use crate::errors::WmiError;

/// A class name plus its key-property assignments, optionally qualified by
/// a namespace (`\\server\root\cimv2`).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ObjectPath {
    namespace: Option<String>,
    class: String,
    keys: Vec<(String, String)>,
    singleton: bool,
}

fn invalid(reason: impl Into<String>) -> WmiError {
    WmiError::InvalidObjectPath {
        reason: reason.into(),
    }
}

fn check_identifier(kind: &str, name: &str) -> Result<(), WmiError> {
    if name.is_empty() {
        return Err(invalid(format!("empty {kind} name")));
    }
    if let Some(c) = name.chars().find(|c| !(c.is_ascii_alphanumeric() || *c == '_')) {
        return Err(invalid(format!("invalid character {c:?} in {kind} name '{name}'")));
    }
    Ok(())
}

impl ObjectPath {
    /// Start a path for `class`.
    pub fn new(class: impl Into<String>) -> Result<Self, WmiError> {
        let class = class.into();
        check_identifier("class", &class)?;
        Ok(Self {
            namespace: None,
            class,
            keys: Vec::new(),
            singleton: false,
        })
    }

    /// Path to the single instance of a singleton class (`Class=@`).
    pub fn singleton(class: impl Into<String>) -> Result<Self, WmiError> {
        let mut path = Self::new(class)?;
        path.singleton = true;
        Ok(path)
    }

    /// Qualify the path with a namespace such as `root\cimv2` or
    /// `\\.\root\cimv2`.
    pub fn in_namespace(mut self, namespace: impl Into<String>) -> Result<Self, WmiError> {
        let namespace = namespace.into();
        if namespace.is_empty() {
            return Err(invalid("empty namespace"));
        }
        if let Some(c) = namespace.chars().find(|c| matches!(c, ':' | '=' | '\'' | '"')) {
            return Err(invalid(format!("invalid character {c:?} in namespace '{namespace}'")));
        }
        self.namespace = Some(namespace);
        Ok(self)
    }

    /// Append a key-property assignment.
    pub fn key(mut self, name: impl Into<String>, value: impl Into<String>) -> Result<Self, WmiError> {
        let name = name.into();
        if self.singleton {
            return Err(invalid(format!("singleton '{}' takes no keys", self.class)));
        }
        check_identifier("key", &name)?;
        if self.keys.iter().any(|(k, _)| k.eq_ignore_ascii_case(&name)) {
            return Err(invalid(format!("duplicate key '{name}'")));
        }
        self.keys.push((name, value.into()));
        Ok(self)
    }

    pub fn class(&self) -> &str {
        &self.class
    }

    pub fn namespace(&self) -> Option<&str> {
        self.namespace.as_deref()
    }

    pub fn is_singleton(&self) -> bool {
        self.singleton
    }

    /// The same path with any namespace qualifier dropped.
    pub fn into_relative(mut self) -> Self {
        self.namespace = None;
        self
    }

    pub fn keys(&self) -> impl Iterator<Item = (&str, &str)> {
        self.keys.iter().map(|(k, v)| (k.as_str(), v.as_str()))
    }

    /// Value of `name`, compared case-insensitively as WMI does.
    pub fn get(&self, name: &str) -> Option<&str> {
        self.keys
            .iter()
            .find(|(k, _)| k.eq_ignore_ascii_case(name))
            .map(|(_, v)| v.as_str())
    }
}

impl fmt::Display for ObjectPath {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if let Some(namespace) = &self.namespace {
            write!(f, "{namespace}:")?;
        }
        f.write_str(&self.class)?;
        if self.singleton {
            return f.write_str("=@");
        }
        for (i, (name, value)) in self.keys.iter().enumerate() {
            f.write_str(if i == 0 { "." } else { "," })?;
            write!(f, "{name}='")?;
            for c in value.chars() {
                if c == '\\' || c == '\'' {
                    f.write_str("\\")?;
                }
                write!(f, "{c}")?;
            }
            f.write_str("'")?;
        }
        Ok(())
    }
}

impl FromStr for ObjectPath {
    type Err = WmiError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        // The namespace ends at the last ':' ahead of the first '=' or quote;
        // values may contain ':' but namespaces and class names may not.
        let head_end = s.find(['=', '\'', '"']).unwrap_or(s.len());
        let (namespace, relative) = match s[..head_end].rfind(':') {
            Some(colon) => (Some(&s[..colon]), &s[colon + 1..]),
            None => (None, s),
        };

        if let Some(class) = relative.strip_suffix("=@") {
            let path = ObjectPath::singleton(class)?;
            return match namespace {
                Some(ns) => path.in_namespace(ns),
                None => Ok(path),
            };
        }

        let (class, mut rest) = match relative.find('.') {
            Some(dot) => (&relative[..dot], &relative[dot + 1..]),
            None => return Err(invalid(format!("'{s}' has no key list"))),
        };
        let mut path = ObjectPath::new(class)?;
        if let Some(ns) = namespace {
            path = path.in_namespace(ns)?;
        }

        loop {
            let eq = rest
                .find('=')
                .ok_or_else(|| invalid(format!("missing '=' after '{rest}'")))?;
            let name = &rest[..eq];
            let (value, tail) = parse_value(&rest[eq + 1..])?;
            path = path.key(name, value)?;

            match tail.strip_prefix(',') {
                Some(next) => rest = next,
                None if tail.is_empty() => break,
                None => return Err(invalid(format!("unexpected '{tail}' after value of '{name}'"))),
            }
        }
        Ok(path)
    }
}

/// Parse one value (quoted or bare) and return it with the unparsed tail.
fn parse_value(input: &str) -> Result<(String, &str), WmiError> {
    let mut chars = input.char_indices();
    match chars.next() {
        Some((_, quote @ ('\'' | '"'))) => {
            let mut value = String::new();
            let mut escaped = false;
            for (i, c) in chars {
                if escaped {
                    value.push(c);
                    escaped = false;
                } else if c == '\\' {
                    escaped = true;
                } else if c == quote {
                    return Ok((value, &input[i + 1..]));
                } else {
                    value.push(c);
                }
            }
            Err(invalid("unterminated quoted value"))
        }
        Some(_) => {
            let end = input.find(',').unwrap_or(input.len());
            let bare = &input[..end];
            if bare.chars().any(|c| c.is_whitespace() || c == '\'' || c == '"') {
                return Err(invalid(format!("malformed bare value '{bare}'")));
            }
            Ok((bare.to_owned(), &input[end..]))
        }
        None => Err(invalid("missing value")),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_render_single_key() {
        let path = ObjectPath::new("Win32_Share").unwrap().key("Name", "scratch").unwrap();
        assert_eq!(path.to_string(), "Win32_Share.Name='scratch'");
    }

    #[test]
    fn test_render_multiple_keys_and_escapes() {
        let path = ObjectPath::new("MSFT_NetFirewallRule")
            .unwrap()
            .key("CreationClassName", "MSFT|FW|it's")
            .unwrap()
            .key("PolicyRuleName", r"C:\rules")
            .unwrap();
        assert_eq!(
            path.to_string(),
            r"MSFT_NetFirewallRule.CreationClassName='MSFT|FW|it\'s',PolicyRuleName='C:\\rules'"
        );
    }

    #[test]
    fn test_parse_inverts_render() {
        let text = r"MyClass.MyProperty1='33',MyProperty2='it\'s'";
        let path: ObjectPath = text.parse().unwrap();
        assert_eq!(path.class(), "MyClass");
        assert_eq!(path.get("myproperty1"), Some("33"));
        assert_eq!(path.get("MyProperty2"), Some("it's"));
        assert_eq!(path.to_string(), text);
    }

    #[test]
    fn test_parse_double_quotes_and_bare_values() {
        let path: ObjectPath = r#"Win32_Process.Handle="4""#.parse().unwrap();
        assert_eq!(path.get("Handle"), Some("4"));

        let path: ObjectPath = "Win32_Process.Handle=4".parse().unwrap();
        assert_eq!(path.get("Handle"), Some("4"));
        assert_eq!(path.to_string(), "Win32_Process.Handle='4'");
    }

    #[test]
    fn test_rejects_malformed() {
        for bad in [
            "",
            "NoKeys",
            ".Name='x'",
            "Class.Name",
            "Class.Name='open",
            "Class.Name='x' trailing",
            "Class.Name='x',",
            "Cl ass.Name='x'",
            "Class.Name='a',name='b'",
            "Class.Name=a b",
        ] {
            assert!(bad.parse::<ObjectPath>().is_err(), "accepted {bad:?}");
        }
    }

    #[test]
    fn test_parse_namespace_qualified() {
        let text = r"\\.\root\cimv2:Win32_Share.Name='x:y'";
        let path: ObjectPath = text.parse().unwrap();
        assert_eq!(path.namespace(), Some(r"\\.\root\cimv2"));
        assert_eq!(path.class(), "Win32_Share");
        assert_eq!(path.get("Name"), Some("x:y"));
        assert_eq!(path.to_string(), text);
        assert_eq!(path.into_relative().to_string(), "Win32_Share.Name='x:y'");

        let path: ObjectPath = r"root\cimv2:Win32_Share.Name='C:\\tmp'".parse().unwrap();
        assert_eq!(path.namespace(), Some(r"root\cimv2"));
        assert_eq!(path.get("Name"), Some(r"C:\tmp"));
    }

    #[test]
    fn test_singleton_paths() {
        let path: ObjectPath = "Win32_WMISetting=@".parse().unwrap();
        assert!(path.is_singleton());
        assert_eq!(path.class(), "Win32_WMISetting");
        assert_eq!(path.keys().count(), 0);
        assert_eq!(path.to_string(), "Win32_WMISetting=@");

        let path: ObjectPath = r"root\cimv2:Win32_WMISetting=@".parse().unwrap();
        assert_eq!(path.namespace(), Some(r"root\cimv2"));
        assert!(path.is_singleton());

        let built = ObjectPath::singleton("Win32_WMISetting")
            .unwrap()
            .in_namespace(r"root\cimv2")
            .unwrap();
        assert_eq!(built, path);
        assert!(ObjectPath::singleton("Win32_WMISetting").unwrap().key("Name", "x").is_err());

        for bad in ["=@", "Win32_WMISetting=@x", ":Win32_WMISetting=@", "Win32_WMISetting.=@"] {
            assert!(bad.parse::<ObjectPath>().is_err(), "accepted {bad:?}");
        }
    }

    #[test]
    fn test_builder_rejects_bad_identifiers() {
        assert!(ObjectPath::new("").is_err());
        assert!(ObjectPath::new("root\\cimv2:Win32_Share").is_err());
        assert!(ObjectPath::new("Win32_Share").unwrap().in_namespace("").is_err());
        assert!(ObjectPath::new("Win32_Share").unwrap().in_namespace("a:b").is_err());
        let err = ObjectPath::new("Win32_Share").unwrap().key("Na.me", "x").unwrap_err();
        assert!(matches!(err, WmiError::InvalidObjectPath { .. }));
    }
}
