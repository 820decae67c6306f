//! Recursive-descent parser from tokens to a [`Rule`] tree. Precedence,
//! loosest to tightest: `||`, `&&`, unary `!`, predicate calls and
//! parenthesized sub-expressions.

use crate::ast::Rule;
use crate::lexer::{lex, Token};
use std::net::IpAddr;
use thiserror::Error;

/// Failure to parse a rule expression (spec §4.4 step 2: "reject with
/// `SyntaxError` diagnostic on parse failure").
#[derive(Debug, Error)]
#[error("syntax error in rule `{rule}`: {reason}")]
pub struct SyntaxError {
    pub rule: String,
    pub reason: String,
}

pub fn parse(rule: &str) -> Result<Rule, SyntaxError> {
    let tokens = lex(rule).map_err(|reason| SyntaxError {
        rule: rule.to_string(),
        reason,
    })?;
    let mut parser = Parser { tokens: &tokens, pos: 0 };
    let result = parser.parse_or().map_err(|reason| SyntaxError {
        rule: rule.to_string(),
        reason,
    })?;
    if parser.pos != parser.tokens.len() {
        return Err(SyntaxError {
            rule: rule.to_string(),
            reason: format!("unexpected trailing tokens at position {}", parser.pos),
        });
    }
    Ok(result)
}

struct Parser<'a> {
    tokens: &'a [Token],
    pos: usize,
}

impl<'a> Parser<'a> {
    fn peek(&self) -> Option<&Token> {
        self.tokens.get(self.pos)
    }

    fn advance(&mut self) -> Option<&Token> {
        let tok = self.tokens.get(self.pos);
        self.pos += 1;
        tok
    }

    fn expect(&mut self, token: &Token) -> Result<(), String> {
        if self.peek() == Some(token) {
            self.pos += 1;
            Ok(())
        } else {
            Err(format!("expected {token:?}, found {:?}", self.peek()))
        }
    }

    fn parse_or(&mut self) -> Result<Rule, String> {
        let mut left = self.parse_and()?;
        while self.peek() == Some(&Token::Or) {
            self.pos += 1;
            let right = self.parse_and()?;
            left = Rule::Or(Box::new(left), Box::new(right));
        }
        Ok(left)
    }

    fn parse_and(&mut self) -> Result<Rule, String> {
        let mut left = self.parse_unary()?;
        while self.peek() == Some(&Token::And) {
            self.pos += 1;
            let right = self.parse_unary()?;
            left = Rule::And(Box::new(left), Box::new(right));
        }
        Ok(left)
    }

    fn parse_unary(&mut self) -> Result<Rule, String> {
        if self.peek() == Some(&Token::Not) {
            self.pos += 1;
            return Ok(Rule::Not(Box::new(self.parse_unary()?)));
        }
        self.parse_primary()
    }

    fn parse_primary(&mut self) -> Result<Rule, String> {
        match self.advance().cloned() {
            Some(Token::LParen) => {
                let inner = self.parse_or()?;
                self.expect(&Token::RParen)?;
                Ok(inner)
            }
            Some(Token::Ident(name)) => self.parse_predicate(&name),
            other => Err(format!("expected a predicate or `(`, found {other:?}")),
        }
    }

    fn parse_args(&mut self) -> Result<Vec<String>, String> {
        self.expect(&Token::LParen)?;
        let mut args = Vec::new();
        if self.peek() != Some(&Token::RParen) {
            loop {
                match self.advance().cloned() {
                    Some(Token::Str(s)) => args.push(s),
                    other => return Err(format!("expected a string literal, found {other:?}")),
                }
                if self.peek() == Some(&Token::Comma) {
                    self.pos += 1;
                    continue;
                }
                break;
            }
        }
        self.expect(&Token::RParen)?;
        Ok(args)
    }

    fn parse_predicate(&mut self, name: &str) -> Result<Rule, String> {
        let args = self.parse_args()?;
        match name {
            "Host" | "HostSNI" => Ok(Rule::Host(args)),
            "HostRegexp" => one_arg(&args, name).and_then(|a| {
                regex::Regex::new(a)
                    .map(Rule::HostRegexp)
                    .map_err(|e| e.to_string())
            }),
            "Path" => Ok(Rule::Path(args)),
            "PathPrefix" => Ok(Rule::PathPrefix(args)),
            "PathRegexp" => one_arg(&args, name).and_then(|a| {
                regex::Regex::new(a)
                    .map(Rule::PathRegexp)
                    .map_err(|e| e.to_string())
            }),
            "Method" => Ok(Rule::Method(args)),
            "Headers" => {
                let (k, v) = two_args(&args, name)?;
                Ok(Rule::Headers(k.to_string(), v.to_string()))
            }
            "HeaderRegexp" => {
                let (k, v) = two_args(&args, name)?;
                let re = regex::Regex::new(v).map_err(|e| e.to_string())?;
                Ok(Rule::HeaderRegexp(k.to_string(), re))
            }
            "Query" => match args.as_slice() {
                [k] => Ok(Rule::Query(k.clone(), None)),
                [k, v] => Ok(Rule::Query(k.clone(), Some(v.clone()))),
                _ => Err(format!("{name} expects 1 or 2 arguments, got {}", args.len())),
            },
            "ClientIP" => {
                let nets = args
                    .iter()
                    .map(|a| parse_cidr(a))
                    .collect::<Result<Vec<_>, _>>()?;
                Ok(Rule::ClientIp(nets))
            }
            other => Err(format!("unknown predicate `{other}`")),
        }
    }
}

fn one_arg<'a>(args: &'a [String], name: &str) -> Result<&'a str, String> {
    match args {
        [a] => Ok(a.as_str()),
        _ => Err(format!("{name} expects exactly 1 argument, got {}", args.len())),
    }
}

fn two_args<'a>(args: &'a [String], name: &str) -> Result<(&'a str, &'a str), String> {
    match args {
        [a, b] => Ok((a.as_str(), b.as_str())),
        _ => Err(format!("{name} expects exactly 2 arguments, got {}", args.len())),
    }
}

fn parse_cidr(raw: &str) -> Result<ipnet::IpNet, String> {
    if let Ok(net) = raw.parse::<ipnet::IpNet>() {
        return Ok(net);
    }
    raw.parse::<IpAddr>()
        .map(|ip| ipnet::IpNet::from(ip))
        .map_err(|_| format!("`{raw}` is not a valid IP or CIDR"))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_single_predicate() {
        let rule = parse("Host(`a.com`)").unwrap();
        matches!(rule, Rule::Host(_));
    }

    #[test]
    fn parses_and_or_not_precedence() {
        // `!A && B || C` should parse as `(!A && B) || C`.
        let rule = parse("!Method(`GET`) && Path(`/a`) || Path(`/b`)").unwrap();
        match rule {
            Rule::Or(left, right) => {
                assert!(matches!(*left, Rule::And(_, _)));
                assert!(matches!(*right, Rule::Path(_)));
            }
            other => panic!("unexpected shape: {other:?}"),
        }
    }

    #[test]
    fn parses_parenthesized_grouping() {
        let rule = parse("Host(`a`) && (Path(`/a`) || Path(`/b`))").unwrap();
        match rule {
            Rule::And(_, right) => assert!(matches!(*right, Rule::Or(_, _))),
            other => panic!("unexpected shape: {other:?}"),
        }
    }

    #[test]
    fn rejects_malformed_rule() {
        assert!(parse("Host(").is_err());
        assert!(parse("Unknown(`a`)").is_err());
        assert!(parse("Headers(`a`)").is_err());
    }
}
