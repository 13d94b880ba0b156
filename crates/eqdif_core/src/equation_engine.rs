//! Text form of polynomial equations.
//!
//! Right-hand sides are written as sums of monomials, e.g.
//! `0.9*prey - 0.2*prey*predator` or `0.05*industrial - 0.05`. Each monomial is
//! a product of numbers and variables, variables optionally raised to a
//! numeric power (`x^2`, `y^-0.5`).

use crate::error::{Result, SimulationError};
use crate::system::{Dependency, Equation, Term};
use std::fmt;

#[derive(Debug, Clone, PartialEq)]
enum Token {
    Number(f64),
    Identifier(String),
    Plus,
    Minus,
    Star,
    Caret,
}

fn tokenize(input: &str) -> Result<Vec<Token>> {
    let mut tokens = Vec::new();
    let mut chars = input.chars().peekable();

    while let Some(&c) = chars.peek() {
        if c.is_whitespace() {
            chars.next();
        } else if c.is_ascii_digit() || c == '.' {
            let mut num_str = String::new();
            while let Some(&d) = chars.peek() {
                let exponent_sign = (d == '-' || d == '+')
                    && (num_str.ends_with('e') || num_str.ends_with('E'));
                if d.is_ascii_digit() || d == '.' || d == 'e' || d == 'E' || exponent_sign {
                    num_str.push(d);
                    chars.next();
                } else {
                    break;
                }
            }
            let value = num_str
                .parse()
                .map_err(|_| SimulationError::Parse(format!("invalid number '{num_str}'")))?;
            tokens.push(Token::Number(value));
        } else if c.is_alphabetic() || c == '_' {
            let mut ident = String::new();
            while let Some(&d) = chars.peek() {
                if d.is_alphanumeric() || d == '_' {
                    ident.push(d);
                    chars.next();
                } else {
                    break;
                }
            }
            tokens.push(Token::Identifier(ident));
        } else {
            let token = match c {
                '+' => Token::Plus,
                '-' => Token::Minus,
                '*' => Token::Star,
                '^' => Token::Caret,
                other => {
                    return Err(SimulationError::Parse(format!(
                        "unexpected character '{other}'"
                    )))
                }
            };
            tokens.push(token);
            chars.next();
        }
    }
    Ok(tokens)
}

struct Parser<'a> {
    tokens: Vec<Token>,
    pos: usize,
    names: &'a [String],
}

impl Parser<'_> {
    fn peek(&self) -> Option<&Token> {
        self.tokens.get(self.pos)
    }

    fn consume(&mut self) -> Option<Token> {
        let token = self.tokens.get(self.pos).cloned();
        if token.is_some() {
            self.pos += 1;
        }
        token
    }

    fn parse_equation(&mut self) -> Result<Equation> {
        let mut terms = Vec::new();

        let mut sign = 1.0;
        if let Some(Token::Minus) = self.peek() {
            self.consume();
            sign = -1.0;
        }
        terms.push(self.parse_term(sign)?);

        while let Some(token) = self.consume() {
            let sign = match token {
                Token::Plus => 1.0,
                Token::Minus => -1.0,
                other => {
                    return Err(SimulationError::Parse(format!(
                        "expected '+' or '-', found {other:?}"
                    )))
                }
            };
            terms.push(self.parse_term(sign)?);
        }

        Ok(Equation::new(terms))
    }

    fn parse_term(&mut self, sign: f64) -> Result<Term> {
        let mut term = Term::constant(sign);
        self.parse_factor(&mut term)?;

        while let Some(Token::Star) = self.peek() {
            self.consume();
            self.parse_factor(&mut term)?;
        }
        Ok(term)
    }

    fn parse_factor(&mut self, term: &mut Term) -> Result<()> {
        match self.consume() {
            Some(Token::Number(n)) => {
                term.coefficient *= n;
                Ok(())
            }
            Some(Token::Identifier(name)) => {
                let variable = self
                    .names
                    .iter()
                    .position(|candidate| *candidate == name)
                    .ok_or_else(|| SimulationError::UnknownVariable(name.clone()))?;

                let mut exponent = 1.0;
                if let Some(Token::Caret) = self.peek() {
                    self.consume();
                    exponent = self.parse_exponent()?;
                }
                term.dependencies.push(Dependency::new(variable, exponent));
                Ok(())
            }
            Some(other) => Err(SimulationError::Parse(format!(
                "expected a number or a variable, found {other:?}"
            ))),
            None => Err(SimulationError::Parse("unexpected end of equation".to_string())),
        }
    }

    fn parse_exponent(&mut self) -> Result<f64> {
        let mut sign = 1.0;
        if let Some(Token::Minus) = self.peek() {
            self.consume();
            sign = -1.0;
        }
        match self.consume() {
            Some(Token::Number(n)) => Ok(sign * n),
            _ => Err(SimulationError::Parse(
                "expected a numeric exponent after '^'".to_string(),
            )),
        }
    }
}

/// Parses the right-hand side of a derivative, resolving variables against
/// `names` (the index of a name is its variable index).
pub fn parse_equation(input: &str, names: &[String]) -> Result<Equation> {
    let tokens = tokenize(input)?;
    if tokens.is_empty() {
        return Ok(Equation::default());
    }
    let mut parser = Parser {
        tokens,
        pos: 0,
        names,
    };
    parser.parse_equation()
}

/// Displays an equation in the form accepted by [`parse_equation`].
pub struct EquationDisplay<'a> {
    equation: &'a Equation,
    names: &'a [String],
}

impl Equation {
    pub fn display<'a>(&'a self, names: &'a [String]) -> EquationDisplay<'a> {
        EquationDisplay {
            equation: self,
            names,
        }
    }
}

impl fmt::Display for EquationDisplay<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.equation.terms.is_empty() {
            return f.write_str("0");
        }

        for (position, term) in self.equation.terms.iter().enumerate() {
            let negative = term.coefficient.is_sign_negative();
            match (position, negative) {
                (0, true) => f.write_str("-")?,
                (0, false) => {}
                (_, true) => f.write_str(" - ")?,
                (_, false) => f.write_str(" + ")?,
            }

            let magnitude = term.coefficient.abs();
            let mut first = true;
            if magnitude != 1.0 || term.dependencies.is_empty() {
                write!(f, "{magnitude}")?;
                first = false;
            }
            for dep in &term.dependencies {
                if !first {
                    f.write_str("*")?;
                }
                first = false;
                match self.names.get(dep.variable) {
                    Some(name) => f.write_str(name)?,
                    None => write!(f, "x{}", dep.variable)?,
                }
                if dep.exponent != 1.0 {
                    write!(f, "^{}", dep.exponent)?;
                }
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn names() -> Vec<String> {
        vec!["prey".to_string(), "predator".to_string()]
    }

    #[test]
    fn parses_lotka_volterra_prey() {
        let eq = parse_equation("0.9*prey - 0.2*prey*predator", &names()).unwrap();
        assert_eq!(
            eq,
            Equation::new(vec![
                Term::new(0.9, vec![Dependency::on(0)]),
                Term::new(-0.2, vec![Dependency::on(0), Dependency::on(1)]),
            ])
        );
    }

    #[test]
    fn parses_constants_exponents_and_leading_minus() {
        let eq = parse_equation("-predator^2 + 3 * 2 - prey^-0.5", &names()).unwrap();
        assert_eq!(eq.terms.len(), 3);
        assert_eq!(eq.terms[0], Term::new(-1.0, vec![Dependency::new(1, 2.0)]));
        assert_eq!(eq.terms[1], Term::constant(6.0));
        assert_eq!(eq.terms[2], Term::new(-1.0, vec![Dependency::new(0, -0.5)]));
    }

    #[test]
    fn parses_scientific_notation() {
        let eq = parse_equation("1e-3*prey", &names()).unwrap();
        assert_eq!(eq.terms[0].coefficient, 1e-3);
    }

    #[test]
    fn empty_input_is_zero_equation() {
        let eq = parse_equation("  ", &names()).unwrap();
        assert!(eq.terms.is_empty());
        assert_eq!(eq.display(&names()).to_string(), "0");
    }

    #[test]
    fn rejects_unknown_variable_and_bad_syntax() {
        assert!(matches!(
            parse_equation("0.5*wolf", &names()),
            Err(SimulationError::UnknownVariable(name)) if name == "wolf"
        ));
        assert!(matches!(
            parse_equation("prey +", &names()),
            Err(SimulationError::Parse(_))
        ));
        assert!(matches!(
            parse_equation("prey / 2", &names()),
            Err(SimulationError::Parse(_))
        ));
        assert!(matches!(
            parse_equation("prey^predator", &names()),
            Err(SimulationError::Parse(_))
        ));
    }

    #[test]
    fn display_is_parseable() {
        let source = "0.2*prey*predator - 0.5*predator + predator^2 - 0.05";
        let eq = parse_equation(source, &names()).unwrap();
        let shown = eq.display(&names()).to_string();
        assert_eq!(shown, source);
        assert_eq!(parse_equation(&shown, &names()).unwrap(), eq);
    }
}
