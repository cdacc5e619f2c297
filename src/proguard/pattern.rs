// Wildcard-to-regex conversion for keep-rule names and types

use regex::Regex;

/// Convert a dotted ProGuard name pattern to a regex over internal names.
///
/// `?` matches one character and `*` any run of characters, neither
/// crossing a package separator; `**` crosses separators.
pub fn name_to_pattern(name: &str) -> String {
    let mut pattern = String::with_capacity(name.len() * 2);
    let mut chars = name.chars().peekable();
    while let Some(c) = chars.next() {
        match c {
            '.' => pattern.push('/'),
            '?' => pattern.push_str("[^/]"),
            '*' => {
                if chars.peek() == Some(&'*') {
                    chars.next();
                    pattern.push_str(".*");
                } else {
                    pattern.push_str("[^/]*");
                }
            }
            _ => pattern.push_str(&regex::escape(&c.to_string())),
        }
    }
    pattern
}

/// Anchored regex for a class, annotation or member name pattern
pub fn compile_name(name: &str) -> Result<Regex, regex::Error> {
    Regex::new(&format!("^{}$", name_to_pattern(name)))
}

/// Descriptor pattern for a Java type name such as `int`, `java.lang.String[]`,
/// `%`, `***` or `...`
pub fn type_to_pattern(java_type: &str) -> String {
    let mut base = java_type;
    let mut dimensions = 0;
    while let Some(stripped) = base.strip_suffix("[]") {
        base = stripped;
        dimensions += 1;
    }

    let mut pattern = "\\[".repeat(dimensions);
    match base {
        "..." | "***" => pattern.push_str(".*"),
        // Any primitive type except void
        "%" => pattern.push_str("[ZBCSIFDJ]"),
        "boolean" => pattern.push('Z'),
        "byte" => pattern.push('B'),
        "char" => pattern.push('C'),
        "short" => pattern.push('S'),
        "int" => pattern.push('I'),
        "float" => pattern.push('F'),
        "double" => pattern.push('D'),
        "long" => pattern.push('J'),
        "void" => pattern.push('V'),
        _ => {
            pattern.push('L');
            pattern.push_str(&name_to_pattern(base));
            pattern.push(';');
        }
    }
    pattern
}

/// Regex over `name:descriptor` of a field; no type means any type
pub fn field_pattern(name: &str, java_type: Option<&str>) -> Result<Regex, regex::Error> {
    let descriptor = java_type.map(type_to_pattern).unwrap_or_else(|| ".*".to_string());
    Regex::new(&format!("^{}:{}$", name_to_pattern(name), descriptor))
}

/// Regex over `name:descriptor` of a method; no return type means `void`
pub fn method_pattern(name: &str, arguments: &[String], return_type: Option<&str>) -> Result<Regex, regex::Error> {
    let arguments: String = arguments.iter().map(|a| type_to_pattern(a)).collect();
    let return_type = return_type.map(type_to_pattern).unwrap_or_else(|| "V".to_string());
    Regex::new(&format!(
        "^{}:\\({}\\){}$",
        name_to_pattern(name),
        arguments,
        return_type
    ))
}
