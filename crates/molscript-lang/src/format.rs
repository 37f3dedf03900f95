//! `sprintf` directive formatting
//!
//! Directives have the shape `%[-][0][width][.precision]conv` with
//! conversions `d i f e s p q` plus `%%`. A directive that cannot be
//! parsed, or has no argument left to consume, is copied to the output
//! unchanged.

use crate::value::{format_float, Value};

#[derive(Debug, Clone, Copy, Default)]
struct Directive {
    left: bool,
    zero: bool,
    width: usize,
    precision: Option<usize>,
    conv: char,
}

/// Parse a directive starting just after `%`; returns it and its length
fn directive(spec: &str) -> Option<(Directive, usize)> {
    let mut d = Directive::default();
    let mut chars = spec.char_indices().peekable();
    while let Some(&(_, c)) = chars.peek() {
        match c {
            '-' => d.left = true,
            '0' => d.zero = true,
            _ => break,
        }
        chars.next();
    }
    let mut width = String::new();
    while let Some(&(_, c)) = chars.peek() {
        if !c.is_ascii_digit() {
            break;
        }
        width.push(c);
        chars.next();
    }
    d.width = width.parse().unwrap_or(0);
    if let Some(&(_, '.')) = chars.peek() {
        chars.next();
        let mut precision = String::new();
        while let Some(&(_, c)) = chars.peek() {
            if !c.is_ascii_digit() {
                break;
            }
            precision.push(c);
            chars.next();
        }
        d.precision = Some(precision.parse().unwrap_or(0));
    }
    let (i, conv) = chars.next()?;
    matches!(conv, 'd' | 'i' | 'f' | 'e' | 's' | 'p' | 'q').then(|| {
        d.conv = conv;
        (d, i + conv.len_utf8())
    })
}

fn pad(text: String, d: &Directive, numeric: bool) -> String {
    let len = text.chars().count();
    if len >= d.width {
        return text;
    }
    let fill = d.width - len;
    if d.left {
        format!("{}{}", text, " ".repeat(fill))
    } else if d.zero && numeric {
        match text.strip_prefix('-') {
            Some(digits) => format!("-{}{}", "0".repeat(fill), digits),
            None => format!("{}{}", "0".repeat(fill), text),
        }
    } else {
        format!("{}{}", " ".repeat(fill), text)
    }
}

fn fixed(x: f32, precision: Option<usize>) -> String {
    match precision {
        Some(p) => format!("{:.*}", p, x),
        None => format!("{}", x),
    }
}

/// Scientific notation with an upper-case, signed, two-digit exponent
pub fn scientific(x: f32, precision: usize) -> String {
    if !x.is_finite() {
        return format!("{}", x);
    }
    let text = format!("{:.*e}", precision, x);
    match text.split_once('e') {
        Some((mantissa, exp)) => {
            let exp: i32 = exp.parse().unwrap_or(0);
            let sign = if exp < 0 { '-' } else { '+' };
            format!("{}E{}{:02}", mantissa, sign, exp.abs())
        }
        None => text,
    }
}

fn point_component(x: f32, precision: Option<usize>) -> String {
    match precision {
        Some(p) => format!("{:.*}", p, x),
        None => format_float(x),
    }
}

fn render(d: &Directive, value: &Value) -> String {
    match d.conv {
        'd' | 'i' => pad(value.as_int().to_string(), d, true),
        'f' => pad(fixed(value.as_float(), d.precision), d, true),
        'e' => pad(scientific(value.as_float(), d.precision.unwrap_or(6)), d, true),
        's' => {
            let s = value.as_string();
            let s = match d.precision {
                Some(p) => s.chars().take(p).collect(),
                None => s,
            };
            pad(s, d, false)
        }
        'p' => match value {
            Value::Point3(p) => format!(
                "{{{} {} {}}}",
                pad(point_component(p.x, d.precision), d, true),
                pad(point_component(p.y, d.precision), d, true),
                pad(point_component(p.z, d.precision), d, true)
            ),
            other => pad(other.as_string(), d, false),
        },
        'q' => match value {
            Value::Point4(p) => {
                let parts: Vec<String> = p
                    .iter()
                    .map(|x| pad(point_component(*x, d.precision), d, true))
                    .collect();
                format!("{{{}}}", parts.join(" "))
            }
            other => pad(other.as_string(), d, false),
        },
        _ => value.as_string(),
    }
}

fn format_scalar(format: &str, args: &[Value]) -> String {
    let mut out = String::with_capacity(format.len());
    let mut args = args.iter();
    let mut rest = format;
    while let Some(at) = rest.find('%') {
        out.push_str(&rest[..at]);
        let spec = &rest[at + 1..];
        if let Some(tail) = spec.strip_prefix('%') {
            out.push('%');
            rest = tail;
            continue;
        }
        match directive(spec) {
            Some((d, len)) => {
                match args.next() {
                    Some(value) => out.push_str(&render(&d, value)),
                    None => out.push_str(&rest[at..at + 1 + len]),
                }
                rest = &spec[len..];
            }
            None => {
                out.push('%');
                rest = spec;
            }
        }
    }
    out.push_str(rest);
    out
}

/// `sprintf(format, args...)`.
///
/// When any argument is a list the format is applied once per element,
/// with scalar arguments repeated, and the result is a list.
pub fn sprintf(format: &str, args: &[Value]) -> Value {
    let rows = args
        .iter()
        .filter_map(|a| match a {
            Value::List(items) => Some(items.len()),
            _ => None,
        })
        .max();
    let Some(rows) = rows else {
        return Value::Text(format_scalar(format, args));
    };
    let lines = (0..rows)
        .map(|i| {
            let row: Vec<Value> = args
                .iter()
                .map(|a| match a {
                    Value::List(items) => items
                        .get(i)
                        .map(|s| Value::parse_item(s))
                        .unwrap_or_default(),
                    other => other.clone(),
                })
                .collect();
            format_scalar(format, &row)
        })
        .collect();
    Value::List(lines)
}

#[cfg(test)]
mod tests {
    use super::*;
    use lin_alg::f32::Vec3;

    fn fmt(format: &str, args: &[Value]) -> String {
        sprintf(format, args).as_string()
    }

    #[test]
    fn test_basic_directives() {
        let args = [Value::Decimal(3.14159), Value::Integer(7), Value::from("x")];
        assert_eq!(fmt("%5.2f|%d|%s", &args), " 3.14|7|x");
        assert_eq!(fmt("%-4d|", &[Value::Integer(5)]), "5   |");
        assert_eq!(fmt("%03i", &[Value::Integer(-5)]), "-05");
        assert_eq!(fmt("100%%", &[]), "100%");
        assert_eq!(fmt("%.2s", &[Value::from("abc")]), "ab");
    }

    #[test]
    fn test_scientific() {
        assert_eq!(fmt("%.2e", &[Value::Integer(150)]), "1.50E+02");
        assert_eq!(scientific(0.0012, 1), "1.2E-03");
    }

    #[test]
    fn test_points() {
        let p = Value::Point3(Vec3::new(1.0, 2.5, -3.0));
        assert_eq!(fmt("%.1p", &[p.clone()]), "{1.0 2.5 -3.0}");
        assert_eq!(fmt("%p", &[p]), "{1.0 2.5 -3.0}");
        let q = Value::Point4([0.0, 0.0, 1.0, 2.0]);
        assert_eq!(fmt("%.0q", &[q]), "{0 0 1 2}");
    }

    #[test]
    fn test_bad_directives_are_verbatim() {
        assert_eq!(fmt("%y and %d", &[Value::Integer(1)]), "%y and 1");
        assert_eq!(fmt("%d %d", &[Value::Integer(1)]), "1 %d");
        assert_eq!(fmt("50%", &[]), "50%");
    }

    #[test]
    fn test_list_argument_yields_list() {
        let list = Value::List(vec!["1".into(), "2".into()]);
        match sprintf("n=%d %s", &[list, Value::from("ok")]) {
            Value::List(items) => assert_eq!(items, ["n=1 ok", "n=2 ok"]),
            other => panic!("expected list, got {:?}", other),
        }
    }
}
