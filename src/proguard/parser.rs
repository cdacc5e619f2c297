// Parser for the supported ProGuard configuration subset

use super::pattern::{compile_name, field_pattern, method_pattern};
use super::specification::{
    modifier_flag, AnnotationSpecification, ClassSpecification, ClassType, ClassTypeSpecification,
    InheritanceSpecification, MemberSpecification, ModifierSpecification, NameSpecification,
};
use super::{KeepKind, KeepRule, KeepRuleError, ProguardKeepRules};
use crate::graph::NodeKind;
use std::collections::HashSet;
use std::fs;
use std::path::{Path, PathBuf};
use tracing::debug;

/// Flags accepted and ignored, with their arguments
const IGNORED_FLAGS: &[&str] = &[
    "-adaptclassstrings",
    "-adaptresourcefilecontents",
    "-adaptresourcefilenames",
    "-allowaccessmodification",
    "-dontnote",
    "-dontobfuscate",
    "-dontoptimize",
    "-dontpreverify",
    "-dontskipnonpubliclibraryclasses",
    "-dontskipnonpubliclibraryclassmembers",
    "-dontusemixedcaseclassnames",
    "-flattenpackagehierarchy",
    "-ignorewarnings",
    "-keepattributes",
    "-keepparameternames",
    "-mergeinterfacesaggressively",
    "-optimizationpasses",
    "-optimizations",
    "-overloadaggressively",
    "-printconfiguration",
    "-printmapping",
    "-printseeds",
    "-printusage",
    "-renamesourcefileattribute",
    "-repackageclasses",
    "-skipnonpubliclibraryclasses",
    "-useuniqueclassmembernames",
    "-verbose",
];

/// Flags that change the meaning of a shrinking run
const UNSUPPORTED_FLAGS: &[&str] = &[
    "-applymapping",
    "-assumenosideeffects",
    "-dontshrink",
    "-injars",
    "-libraryjars",
    "-outjars",
    "-whyareyoukeeping",
];

#[derive(Debug, Clone, PartialEq, Eq)]
enum Token {
    Word(String),
    Symbol(char),
}

#[derive(Debug, Clone)]
struct Lexeme {
    token: Token,
    line: usize,
}

fn is_symbol(c: char) -> bool {
    matches!(c, '{' | '}' | ';' | '(' | ')' | ',' | '!' | '@')
}

fn tokenize(text: &str) -> Vec<Lexeme> {
    let mut lexemes = Vec::new();
    for (index, raw) in text.lines().enumerate() {
        let line = index + 1;
        let content = raw.split('#').next().unwrap_or("");
        let mut chars = content.chars().peekable();
        while let Some(&c) = chars.peek() {
            if c.is_whitespace() {
                chars.next();
            } else if is_symbol(c) {
                chars.next();
                lexemes.push(Lexeme {
                    token: Token::Symbol(c),
                    line,
                });
            } else if c == '\'' || c == '"' {
                chars.next();
                let word: String = chars.by_ref().take_while(|ch| *ch != c).collect();
                lexemes.push(Lexeme {
                    token: Token::Word(word),
                    line,
                });
            } else {
                let mut word = String::new();
                while let Some(&ch) = chars.peek() {
                    if ch.is_whitespace() || is_symbol(ch) {
                        break;
                    }
                    word.push(ch);
                    chars.next();
                }
                lexemes.push(Lexeme {
                    token: Token::Word(word),
                    line,
                });
            }
        }
    }
    lexemes
}

/// Parse `text` into `rules`. `origin` names the text in errors and
/// `base_dir` resolves relative `-include` paths.
pub(super) fn parse_into(
    rules: &mut ProguardKeepRules,
    text: &str,
    origin: &str,
    base_dir: Option<&Path>,
    visiting: &mut HashSet<PathBuf>,
) -> Result<(), KeepRuleError> {
    let mut parser = Parser {
        lexemes: tokenize(text),
        pos: 0,
        origin: origin.to_string(),
    };
    while parser.pos < parser.lexemes.len() {
        parser.flag(rules, base_dir, visiting)?;
    }
    Ok(())
}

/// Parse a file and everything it includes
pub(super) fn parse_file_into(
    rules: &mut ProguardKeepRules,
    path: &Path,
    visiting: &mut HashSet<PathBuf>,
) -> Result<(), KeepRuleError> {
    let canonical = path.canonicalize().unwrap_or_else(|_| path.to_path_buf());
    if !visiting.insert(canonical.clone()) {
        debug!("Skipping recursive include of {}", path.display());
        return Ok(());
    }
    let text = fs::read_to_string(path).map_err(|source| KeepRuleError::Io {
        path: path.to_path_buf(),
        source,
    })?;
    let result = parse_into(rules, &text, &path.display().to_string(), path.parent(), visiting);
    visiting.remove(&canonical);
    result
}

struct Parser {
    lexemes: Vec<Lexeme>,
    pos: usize,
    origin: String,
}

impl Parser {
    fn peek(&self) -> Option<&Token> {
        self.lexemes.get(self.pos).map(|l| &l.token)
    }

    fn line(&self) -> usize {
        self.lexemes
            .get(self.pos)
            .or_else(|| self.lexemes.last())
            .map_or(0, |l| l.line)
    }

    fn error(&self, message: impl Into<String>) -> KeepRuleError {
        KeepRuleError::Parse {
            origin: self.origin.clone(),
            line: self.line(),
            message: message.into(),
        }
    }

    fn eat_symbol(&mut self, symbol: char) -> bool {
        if self.peek() == Some(&Token::Symbol(symbol)) {
            self.pos += 1;
            true
        } else {
            false
        }
    }

    fn expect_symbol(&mut self, symbol: char) -> Result<(), KeepRuleError> {
        if self.eat_symbol(symbol) {
            Ok(())
        } else {
            Err(self.error(format!("expected `{}`", symbol)))
        }
    }

    fn expect_word(&mut self) -> Result<String, KeepRuleError> {
        match self.peek() {
            Some(Token::Word(word)) => {
                let word = word.clone();
                self.pos += 1;
                Ok(word)
            }
            Some(Token::Symbol(c)) => Err(self.error(format!("unexpected `{}`", c))),
            None => Err(self.error("unexpected end of input")),
        }
    }

    fn at_flag(&self) -> bool {
        matches!(self.peek(), Some(Token::Word(w)) if w.starts_with('-') && w.len() > 1)
    }

    fn skip_arguments(&mut self) {
        while self.pos < self.lexemes.len() && !self.at_flag() {
            self.pos += 1;
        }
    }

    fn flag(
        &mut self,
        rules: &mut ProguardKeepRules,
        base_dir: Option<&Path>,
        visiting: &mut HashSet<PathBuf>,
    ) -> Result<(), KeepRuleError> {
        let line = self.line();
        if !self.at_flag() {
            return Err(self.error("expected a flag"));
        }
        let flag = self.expect_word()?;

        let kind = match flag.as_str() {
            "-keep" => Some(KeepKind::Keep),
            "-keepclassmembers" => Some(KeepKind::KeepClassMembers),
            "-keepclasseswithmembers" => Some(KeepKind::KeepClassesWithMembers),
            "-keepnames" | "-keepclassmembernames" | "-keepclasseswithmembernames" => {
                // Names-only rules imply allowshrinking
                self.options()?;
                self.class_specification()?;
                debug!("{}:{}: {} has no effect on shrinking", self.origin, line, flag);
                return Ok(());
            }
            "-dontwarn" => {
                for pattern in self.filter()? {
                    rules.dont_warn.push(compile_name(&pattern)?);
                }
                return Ok(());
            }
            "-include" => {
                let file = self.expect_word()?;
                let path = match base_dir {
                    Some(dir) if Path::new(&file).is_relative() => dir.join(&file),
                    _ => PathBuf::from(&file),
                };
                return parse_file_into(rules, &path, visiting);
            }
            _ => None,
        };

        match kind {
            Some(kind) => {
                let allow_shrinking = self.options()?;
                let mut class = self.class_specification()?;
                class.allow_shrinking = allow_shrinking;
                rules.rules.push(KeepRule { kind, class });
                Ok(())
            }
            None if IGNORED_FLAGS.contains(&flag.as_str()) => {
                debug!("{}:{}: ignoring {}", self.origin, line, flag);
                self.skip_arguments();
                Ok(())
            }
            None if UNSUPPORTED_FLAGS.contains(&flag.as_str()) => Err(KeepRuleError::UnsupportedFlag {
                origin: self.origin.clone(),
                line,
                flag,
            }),
            None => Err(KeepRuleError::Parse {
                origin: self.origin.clone(),
                line,
                message: format!("unknown flag {}", flag),
            }),
        }
    }

    /// `,allowshrinking,allowobfuscation`; true if shrinking is allowed
    fn options(&mut self) -> Result<bool, KeepRuleError> {
        let mut allow_shrinking = false;
        while self.eat_symbol(',') {
            if self.expect_word()? == "allowshrinking" {
                allow_shrinking = true;
            }
        }
        Ok(allow_shrinking)
    }

    /// Comma-separated name list; negated names are dropped
    fn filter(&mut self) -> Result<Vec<String>, KeepRuleError> {
        let mut names = Vec::new();
        if self.at_flag() || self.peek().is_none() {
            names.push("**".to_string());
            return Ok(names);
        }
        loop {
            let negated = self.eat_symbol('!');
            let name = self.expect_word()?;
            if !negated {
                names.push(name);
            }
            if !self.eat_symbol(',') {
                break;
            }
        }
        Ok(names)
    }

    fn name(&self, pattern: &str, negated: bool) -> Result<NameSpecification, KeepRuleError> {
        Ok(NameSpecification::new(compile_name(pattern)?, negated))
    }

    fn annotation(&mut self) -> Result<AnnotationSpecification, KeepRuleError> {
        let negated = self.eat_symbol('!');
        let name = self.expect_word()?;
        Ok(AnnotationSpecification::new(self.name(&name, negated)?))
    }

    fn class_specification(&mut self) -> Result<ClassSpecification, KeepRuleError> {
        let mut annotation = None;
        let mut modifiers = ModifierSpecification::default();
        let class_type = loop {
            let negated = self.eat_symbol('!');
            if self.eat_symbol('@') {
                if self.peek() == Some(&Token::Word("interface".to_string())) {
                    self.pos += 1;
                    break ClassTypeSpecification {
                        class_type: ClassType::Annotation,
                        negated,
                    };
                }
                annotation = Some(self.annotation()?);
                continue;
            }
            let word = self.expect_word()?;
            let class_type = match word.as_str() {
                "class" => ClassType::Class,
                "interface" => ClassType::Interface,
                "enum" => ClassType::Enum,
                _ => match modifier_flag(&word) {
                    Some(flag) => {
                        modifiers.add(flag, negated);
                        continue;
                    }
                    None => return Err(self.error(format!("expected class, interface or enum, found `{}`", word))),
                },
            };
            break ClassTypeSpecification { class_type, negated };
        };

        let negated = self.eat_symbol('!');
        let name = self.expect_word()?;
        let name = if name == "*" { "**".to_string() } else { name };
        let mut spec = ClassSpecification::new(self.name(&name, negated)?);
        spec.class_type = Some(class_type);
        spec.annotation = annotation;
        spec.modifiers = modifiers;

        if matches!(self.peek(), Some(Token::Word(w)) if w == "extends" || w == "implements") {
            self.pos += 1;
            let annotation = if self.eat_symbol('@') {
                Some(self.annotation()?)
            } else {
                None
            };
            let negated = self.eat_symbol('!');
            let parent = self.expect_word()?;
            spec.inheritance = Some(InheritanceSpecification {
                name: self.name(&parent, negated)?,
                annotation,
            });
        }

        if self.eat_symbol('{') {
            while !self.eat_symbol('}') {
                if self.peek().is_none() {
                    return Err(self.error("unterminated member list"));
                }
                self.member(&mut spec)?;
            }
        }
        Ok(spec)
    }

    fn member(&mut self, spec: &mut ClassSpecification) -> Result<(), KeepRuleError> {
        let annotation = if self.eat_symbol('@') {
            Some(self.annotation()?)
        } else {
            None
        };

        let mut modifiers = ModifierSpecification::default();
        loop {
            if self.eat_symbol('!') {
                let word = self.expect_word()?;
                let flag = modifier_flag(&word).ok_or_else(|| self.error(format!("`{}` is not a modifier", word)))?;
                modifiers.add(flag, true);
                continue;
            }
            match self.peek() {
                Some(Token::Word(w)) if modifier_flag(w).is_some() => {
                    let flag = modifier_flag(w).unwrap_or_default();
                    modifiers.add(flag, false);
                    self.pos += 1;
                }
                _ => break,
            }
        }

        let mut push = |kind: NodeKind, pattern| {
            spec.members.push(MemberSpecification {
                kind,
                pattern,
                modifiers,
                annotation: annotation.clone(),
            });
        };

        let first = self.expect_word()?;
        match first.as_str() {
            "<fields>" => {
                self.expect_symbol(';')?;
                push(NodeKind::Field, field_pattern("*", None)?);
            }
            "<methods>" => {
                self.expect_symbol(';')?;
                push(NodeKind::Method, method_pattern("*", &["...".to_string()], Some("***"))?);
            }
            "*" if self.peek() == Some(&Token::Symbol(';')) => {
                self.pos += 1;
                push(NodeKind::Method, method_pattern("*", &["...".to_string()], Some("***"))?);
                push(NodeKind::Field, field_pattern("*", None)?);
            }
            _ if self.peek() == Some(&Token::Symbol('(')) => {
                // Constructors are written without a return type
                self.pos += 1;
                let arguments = self.arguments()?;
                self.expect_symbol(';')?;
                push(NodeKind::Method, method_pattern(&first, &arguments, None)?);
            }
            _ => {
                let name = self.expect_word()?;
                if self.eat_symbol('(') {
                    let arguments = self.arguments()?;
                    self.expect_symbol(';')?;
                    push(NodeKind::Method, method_pattern(&name, &arguments, Some(&first))?);
                } else {
                    self.expect_symbol(';')?;
                    push(NodeKind::Field, field_pattern(&name, Some(&first))?);
                }
            }
        }
        Ok(())
    }

    /// Argument types up to and including the closing parenthesis
    fn arguments(&mut self) -> Result<Vec<String>, KeepRuleError> {
        let mut arguments = Vec::new();
        if self.eat_symbol(')') {
            return Ok(arguments);
        }
        loop {
            arguments.push(self.expect_word()?);
            if !self.eat_symbol(',') {
                break;
            }
        }
        self.expect_symbol(')')?;
        Ok(arguments)
    }
}
