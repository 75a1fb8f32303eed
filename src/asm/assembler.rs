use anyhow::Result;
use rustc_hash::FxHashMap;

use crate::plat::{Word, MEMORY_SIZE};

use super::{lexer::lex_program, AsmError, Token, WithSpan};

/// An assembly context capable of translating a source file into a word image.
#[derive(Debug, Default)]
pub struct Assembler<'a> {
    labels: FxHashMap<&'a str, Word>,
    /// Output positions still waiting for a label's address.
    fixups: Vec<(usize, &'a str)>,
    out: Vec<Word>,
}

impl<'a> Assembler<'a> {
    /// Generates a word image from assembly source code.
    ///
    /// # Errors
    ///
    /// This function will return an error if the provided assembly source is not valid syntax,
    /// if a label is defined twice or never, or if the result does not fit in memory.
    pub fn assemble(&mut self, program_text: &'a str) -> Result<Vec<Word>> {
        let tokens = lex_program(program_text)?;
        let mut toks = &tokens[..];

        while let Some(tok) = toks.first() {
            toks = &toks[1..];
            match tok.item {
                Token::Eof => break,
                Token::LabelDef(name) => {
                    let here = self.out.len() as Word;
                    if self.labels.insert(name, here).is_some() {
                        return Err(AsmError::DuplicateLabel(name.to_owned()).into());
                    }
                }
                Token::Mnemonic(op) => {
                    self.out.push(op as Word);
                    for _ in 0..op.arity() {
                        match toks.first() {
                            Some(next) if self.operand(next) => toks = &toks[1..],
                            _ => {
                                return Err(AsmError::MissingOperand {
                                    op,
                                    expected: op.arity(),
                                    line: tok.line(),
                                }
                                .into())
                            }
                        }
                    }
                }
                Token::Word => {
                    while let Some(next) = toks.first() {
                        if !self.operand(next) {
                            break;
                        }
                        toks = &toks[1..];
                    }
                }
                Token::Label(_) | Token::Literal(_) | Token::Register(_) => {
                    let text = tok.span.fragment();
                    let word = text.split_whitespace().next().unwrap_or_default();
                    return Err(AsmError::UnexpectedToken(word.to_owned()).into());
                }
            }
        }

        self.link()?;
        if self.out.len() > MEMORY_SIZE {
            return Err(AsmError::ProgramTooLarge(self.out.len()).into());
        }
        log::debug!("assembled {} words, {} labels", self.out.len(), self.labels.len());
        Ok(std::mem::take(&mut self.out))
    }

    /// Emits `tok` if it can stand as an operand.
    fn operand(&mut self, tok: &WithSpan<'a, Token<'a>>) -> bool {
        let word = match tok.item {
            Token::Literal(w) => w,
            Token::Register(reg) => reg.word(),
            Token::Label(name) => {
                self.fixups.push((self.out.len(), name));
                0
            }
            _ => return false,
        };
        self.out.push(word);
        true
    }

    fn link(&mut self) -> Result<(), AsmError> {
        for (at, name) in self.fixups.drain(..) {
            let addr = self
                .labels
                .get(name)
                .ok_or_else(|| AsmError::UndefinedLabel(name.to_owned()))?;
            self.out[at] = *addr;
        }
        Ok(())
    }
}

/// Assembles `program_text` with a fresh [Assembler].
pub fn assemble(program_text: &str) -> Result<Vec<Word>> {
    Assembler::default().assemble(program_text)
}
