//! Generic signature parsing
//!
//! Only the referenced class names are extracted. For nested generic types
//! (`Lpkg/Outer<TT;>.Inner;`) only the outermost class is reported.

use super::{ClassFileError, Result};

struct SignatureParser<'a> {
    input: &'a str,
    bytes: &'a [u8],
    pos: usize,
    classes: Vec<String>,
}

/// Class names referenced by a class, method or field signature
pub fn referenced_classes(signature: &str) -> Result<Vec<String>> {
    let mut parser = SignatureParser {
        input: signature,
        bytes: signature.as_bytes(),
        pos: 0,
        classes: Vec::new(),
    };
    parser.parse_top()?;
    Ok(parser.classes)
}

impl<'a> SignatureParser<'a> {
    fn error(&self) -> ClassFileError {
        ClassFileError::MalformedSignature(self.input.to_string())
    }

    fn peek(&self) -> Option<u8> {
        self.bytes.get(self.pos).copied()
    }

    fn expect(&mut self, byte: u8) -> Result<()> {
        if self.peek() == Some(byte) {
            self.pos += 1;
            Ok(())
        } else {
            Err(self.error())
        }
    }

    fn parse_top(&mut self) -> Result<()> {
        if self.peek() == Some(b'<') {
            self.parse_type_parameters()?;
        }
        if self.peek() == Some(b'(') {
            self.pos += 1;
            while self.peek() != Some(b')') {
                self.parse_type()?;
            }
            self.pos += 1;
        }
        while let Some(next) = self.peek() {
            if next == b'^' {
                self.pos += 1;
            }
            self.parse_type()?;
        }
        Ok(())
    }

    fn parse_type_parameters(&mut self) -> Result<()> {
        self.expect(b'<')?;
        while self.peek() != Some(b'>') {
            self.identifier(b':')?;
            self.expect(b':')?;
            // class bound may be empty
            if matches!(self.peek(), Some(b'L' | b'T' | b'[')) {
                self.parse_type()?;
            }
            while self.peek() == Some(b':') {
                self.pos += 1;
                self.parse_type()?;
            }
        }
        self.expect(b'>')
    }

    fn identifier(&mut self, stop: u8) -> Result<&'a str> {
        let start = self.pos;
        while let Some(b) = self.peek() {
            if b == stop || matches!(b, b';' | b'<' | b'.' | b'>' | b':') {
                break;
            }
            self.pos += 1;
        }
        if self.pos == start || self.pos >= self.bytes.len() {
            return Err(self.error());
        }
        Ok(&self.input[start..self.pos])
    }

    fn parse_type(&mut self) -> Result<()> {
        match self.peek() {
            Some(b'B' | b'C' | b'D' | b'F' | b'I' | b'J' | b'S' | b'Z' | b'V') => {
                self.pos += 1;
                Ok(())
            }
            Some(b'[') => {
                self.pos += 1;
                self.parse_type()
            }
            Some(b'T') => {
                self.pos += 1;
                self.identifier(b';')?;
                self.expect(b';')
            }
            Some(b'L') => {
                self.pos += 1;
                self.parse_class_type()
            }
            _ => Err(self.error()),
        }
    }

    fn parse_class_type(&mut self) -> Result<()> {
        let name = self.identifier(b';')?;
        self.classes.push(name.to_string());
        loop {
            match self.peek() {
                Some(b'<') => self.parse_type_arguments()?,
                Some(b'.') => {
                    self.pos += 1;
                    self.identifier(b';')?;
                }
                Some(b';') => {
                    self.pos += 1;
                    return Ok(());
                }
                _ => return Err(self.error()),
            }
        }
    }

    fn parse_type_arguments(&mut self) -> Result<()> {
        self.expect(b'<')?;
        while self.peek() != Some(b'>') {
            match self.peek() {
                Some(b'*') => self.pos += 1,
                Some(b'+' | b'-') => {
                    self.pos += 1;
                    self.parse_type()?;
                }
                Some(_) => self.parse_type()?,
                None => return Err(self.error()),
            }
        }
        self.expect(b'>')
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_field_signature() {
        let classes = referenced_classes("Ljava/util/List<Ltest/Foo;>;").unwrap();
        assert_eq!(classes, vec!["java/util/List", "test/Foo"]);
    }

    #[test]
    fn test_class_signature_with_bounds() {
        let classes = referenced_classes(
            "<T:Ltest/Base;:Ljava/lang/Comparable<TT;>;>Ljava/lang/Object;Ltest/Iface<TT;>;",
        )
        .unwrap();
        assert_eq!(
            classes,
            vec![
                "test/Base",
                "java/lang/Comparable",
                "java/lang/Object",
                "test/Iface"
            ]
        );
    }

    #[test]
    fn test_method_signature_with_throws_and_wildcards() {
        let classes = referenced_classes(
            "<E:Ljava/lang/Exception;>(Ljava/util/Map<*+Ltest/Key;>;[TE;)Ltest/Outer<TE;>.Inner;^TE;^Ltest/Failure;",
        )
        .unwrap();
        assert_eq!(
            classes,
            vec![
                "java/lang/Exception",
                "java/util/Map",
                "test/Key",
                "test/Outer",
                "test/Failure"
            ]
        );
    }

    #[test]
    fn test_malformed_signature() {
        assert!(referenced_classes("Ltest/Foo").is_err());
        assert!(referenced_classes("Ltest/Foo<").is_err());
        assert!(referenced_classes("Q").is_err());
    }
}
