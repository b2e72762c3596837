//! Análisis léxico.
//!
//! # Tokenization
//! Esta es la primera fase del front end. Descompone un [`InputStream`]
//! (flujo de caracteres) en unidades léxicas denominadas tokens. Los espacios
//! en blanco y los comentarios se descartan durante esta operación. Cada
//! token emitido esta asociado a una ubicación en el código fuente original,
//! lo cual permite rastrear errores en tanto los mismos como constructos
//! más elevados de fases posteriores.
//!
//! # Contenido de un token
//! Operadores, puntuación y palabras clave se identifican por el hecho de lo
//! que son y no incluyen lexemas. Los identificadores y las constantes
//! literales preservan su lexema original, ya que este se reproduce tal cual
//! en el código intermedio.
//!
//! # Reglas importantes del lenguaje
//! - El lenguaje distingue mayúsculas de minúsculas.
//! - Se admiten comentarios `//` y `/* */`.
//! - Las líneas que inician con `#` son directivas de preprocesador ya
//!   resueltas y se descartan.
//!
//! # Errores
//! El lexer es capaz de recuperarse parcialmente de condiciones de error.
//! Esto ocurre en suficiente grado como para reportar más de un error por
//! ejecución, pero no lo suficiente como para permitir el avance a las
//! demás fases de la compilación.

use crate::source::{InputStream, Located, Location};
use std::{
    fmt::{self, Display},
    rc::Rc,
    str::FromStr,
};

use thiserror::Error;

/// Error de escaneo.
#[non_exhaustive]
#[derive(Error, Debug)]
pub enum LexerError {
    /// Error de E/S originado por el [`InputStream`].
    #[error("I/O error")]
    Input(#[from] std::io::Error),

    /// Carácter desconocido o inesperado en el flujo de entrada.
    #[error("Bad character {0:?} in input stream")]
    BadChar(char),

    /// Una constante entera se encuentra fuera de rango.
    #[error("Integer literal overflow, valid range is [0, {}]", i32::MAX)]
    IntOverflow,

    /// Un literal de carácter o de cadena no se cerró antes del fin de línea.
    #[error("Unterminated literal, expected closing {0:?}")]
    Unterminated(char),

    /// Un comentario `/*` no se cerró antes del fin de la entrada.
    #[error("Unterminated block comment")]
    UnterminatedComment,
}

/// Un identificador.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Identifier(Rc<str>);

impl AsRef<str> for Identifier {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

impl Display for Identifier {
    fn fmt(&self, fmt: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt.write_str(&self.0)
    }
}

/// Objeto resultante del análisis léxico.
///
/// Un token contiene suficiente información para describir completamente
/// a una entidad léxica en el programa fuente.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Token {
    /// Identificador.
    Id(Identifier),

    /// Palabra clave.
    Keyword(Keyword),

    /// Literal de entero.
    IntLiteral(Rc<str>),

    /// Literal de carácter, con comillas.
    CharLiteral(Rc<str>),

    /// Literal de cadena, con comillas.
    StringLiteral(Rc<str>),

    /// `=`
    Assign,

    /// `==`
    Equal,

    /// `!=`
    NotEqual,

    /// `!`
    Not,

    /// `<`
    Less,

    /// `<=`
    LessOrEqual,

    /// `>`
    Greater,

    /// `>=`
    GreaterOrEqual,

    /// `+`
    Plus,

    /// `-`
    Minus,

    /// `*`
    Times,

    /// `/`
    Slash,

    /// `%`
    Percent,

    /// `->`
    Arrow,

    /// `,`
    Comma,

    /// `;`
    Semicolon,

    /// `(`
    OpenParen,

    /// `)`
    CloseParen,

    /// `{`
    OpenCurly,

    /// `}`
    CloseCurly,

    /// `[`
    OpenSquare,

    /// `]`
    CloseSquare,
}

impl Display for Token {
    fn fmt(&self, fmt: &mut fmt::Formatter<'_>) -> fmt::Result {
        use Token::*;

        let symbol = match self {
            Id(id) => return write!(fmt, "identifier `{}`", id),
            Keyword(keyword) => return write!(fmt, "keyword `{}`", keyword),
            IntLiteral(literal) | CharLiteral(literal) | StringLiteral(literal) => {
                return write!(fmt, "literal `{}`", literal)
            }

            Assign => "=",
            Equal => "==",
            NotEqual => "!=",
            Not => "!",
            Less => "<",
            LessOrEqual => "<=",
            Greater => ">",
            GreaterOrEqual => ">=",
            Plus => "+",
            Minus => "-",
            Times => "*",
            Slash => "/",
            Percent => "%",
            Arrow => "->",
            Comma => ",",
            Semicolon => ";",
            OpenParen => "(",
            CloseParen => ")",
            OpenCurly => "{",
            CloseCurly => "}",
            OpenSquare => "[",
            CloseSquare => "]",
        };

        write!(fmt, "`{}`", symbol)
    }
}

/// Una palabra clave.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum Keyword {
    Void,
    Int,
    String,
    Struct,
    Ptr,
    Array,
    If,
    Else,
    While,
    Return,
    Alloc,
    Nullptr,
}

const KEYWORDS: &[(&str, Keyword)] = &[
    ("void",    Keyword::Void),
    ("int",     Keyword::Int),
    ("string",  Keyword::String),
    ("struct",  Keyword::Struct),
    ("ptr",     Keyword::Ptr),
    ("array",   Keyword::Array),
    ("if",      Keyword::If),
    ("else",    Keyword::Else),
    ("while",   Keyword::While),
    ("return",  Keyword::Return),
    ("alloc",   Keyword::Alloc),
    ("nullptr", Keyword::Nullptr),
];

impl Display for Keyword {
    fn fmt(&self, fmt: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = KEYWORDS
            .iter()
            .find(|(_, keyword)| keyword == self)
            .map(|(name, _)| *name)
            .unwrap_or("?");

        fmt.write_str(name)
    }
}

impl FromStr for Keyword {
    type Err = ();

    fn from_str(string: &str) -> Result<Self, Self::Err> {
        KEYWORDS
            .iter()
            .find(|&&(name, _)| name == string)
            .map(|&(_, keyword)| keyword)
            .ok_or(())
    }
}

/// Máquina de estados para análisis léxico.
///
/// Un lexer puede encontrarse en uno de diversos estados. La
/// salida del lexer, así como su siguiente estado, se define
/// a partir de tanto su estado actual como el siguiente carácter
/// encontrado en el flujo de entrada.
pub struct Lexer<S: Iterator> {
    source: std::iter::Peekable<S>,
    state: State,
    start: Location,
    next: Location,
    line_start: bool,
}

/// Posibles estados del lexer.
enum State {
    /// Estado que ocurre antes de encontrar el inicio de un token.
    Start,

    /// Estado de error.
    Error,

    /// Estado de completitud; siempre emite el token incluido,
    /// consume la entrada actual y pasa a [`State::Start`].
    Complete(Token),

    /// Operador de un carácter que podría extenderse a dos,
    /// como `=` hacia `==` o `-` hacia `->`.
    Operator(Token),

    /// Se encontró `/`. Puede iniciar un comentario o ser una división.
    Slash,

    /// Comentario de línea.
    ///
    /// Este estado vuelve a [`State::Start`] al encontrar `'\n'`.
    Comment,

    /// Comentario de bloque. El booleano indica si el último
    /// carácter fue `*`.
    BlockComment(bool),

    /// Constante entera.
    Integer(String),

    /// Literal delimitado por comillas simples o dobles.
    Quoted {
        text: String,
        quote: char,
        escaped: bool,
    },

    /// Término que puede ser un identificador o una palabra clave.
    Word(String),
}

impl<S: InputStream> Lexer<S> {
    /// Crea un lexer en estado inicial a partir de un flujo.
    pub fn new(start: Location, source: S) -> Self {
        let next = start.clone();
        Lexer {
            source: source.peekable(),
            state: State::Start,
            start,
            next,
            line_start: true,
        }
    }

    /// Reduce la entrada a sea una secuencia conocida de tokens
    /// infalibles o una secuencia de errores.
    ///
    /// En caso de que ocurra al menos un error, el lexer dejará
    /// de buscar tokens exitosos y comenzará a acumular solamente
    /// errores. El propósito de esta función es permitir la
    /// recolección de múltiples errores léxicos en una misma ejecución
    /// del compilador.
    pub fn try_exhaustive(mut self) -> Result<Vec<Located<Token>>, Vec<Located<LexerError>>> {
        let mut tokens = Vec::new();

        while let Some(result) = self.next() {
            match result {
                Ok(token) => tokens.push(token),
                Err(error) => {
                    drop(tokens);

                    let mut errors = vec![error];
                    errors.extend(self.filter_map(Result::err));

                    return Err(errors);
                }
            }
        }

        Ok(tokens)
    }

    /// Intenta construir un siguiente token.
    fn lex(&mut self) -> Result<Option<(Token, Location)>, LexerError> {
        use {State::*, Token::*};

        let mut last_accepted = self.start.clone();
        let token = loop {
            // Se espera un siguiente carácter, fallando si hay error de E/S
            let next_char = match self.source.peek() {
                None => None,
                Some(Ok((c, _))) => Some(*c),
                Some(Err(_)) => match self.source.next() {
                    Some(Err(error)) => break Err(error.into()),
                    _ => None,
                },
            };

            // La posición de origen se mueve junto a la posición
            // siguiente siempre que no se haya encontrado una
            // frontera de token
            if let Start = self.state {
                self.start = self.next.clone();
            }

            let at_line_start = self.line_start;
            self.line_start = match next_char {
                Some('\n') => true,
                Some(c) if c.is_ascii_whitespace() => at_line_start,
                _ => false,
            };

            // Switch table principal, determina cambios de estado
            // y de salida del lexer a partir de combinaciones del
            // estado actual y el siguiente carácter
            match (&mut self.state, next_char) {
                // Condiciones de error: se descarta la línea donde
                // ocurrió el error. Al llegar al final de la línea
                // el lexer se recupera y reinicia.
                (Error, None) => return Ok(None),
                (Error, Some('\n')) => self.state = Start,
                (Error, Some(_)) => (),

                // Tokens triviales
                (Start, None) => return Ok(None),
                (Start, Some(',')) => self.state = Complete(Comma),
                (Start, Some(';')) => self.state = Complete(Semicolon),
                (Start, Some('(')) => self.state = Complete(OpenParen),
                (Start, Some(')')) => self.state = Complete(CloseParen),
                (Start, Some('{')) => self.state = Complete(OpenCurly),
                (Start, Some('}')) => self.state = Complete(CloseCurly),
                (Start, Some('[')) => self.state = Complete(OpenSquare),
                (Start, Some(']')) => self.state = Complete(CloseSquare),
                (Start, Some('+')) => self.state = Complete(Plus),
                (Start, Some('*')) => self.state = Complete(Times),
                (Start, Some('%')) => self.state = Complete(Percent),

                // Operadores que admiten un segundo carácter
                (Start, Some('=')) => self.state = Operator(Assign),
                (Start, Some('!')) => self.state = Operator(Not),
                (Start, Some('<')) => self.state = Operator(Less),
                (Start, Some('>')) => self.state = Operator(Greater),
                (Start, Some('-')) => self.state = Operator(Minus),
                (Start, Some('/')) => self.state = State::Slash,

                // Directivas de preprocesador
                (Start, Some('#')) if at_line_start => self.state = Comment,

                (Start, Some(c @ ('\'' | '"'))) => {
                    self.state = Quoted {
                        text: c.to_string(),
                        quote: c,
                        escaped: false,
                    }
                }

                // Identificadores y palabras clave
                (Start, Some(c)) if c.is_ascii_alphabetic() || c == '_' => {
                    self.state = Word(c.to_string())
                }

                (Start, Some(c)) if c.is_ascii_digit() => self.state = Integer(c.to_string()),

                // Espacios en blanco y caracteres inesperados
                (Start, Some(c)) if c.is_ascii_whitespace() => (),
                (Start, Some(c)) => break Err(LexerError::BadChar(c)),

                // Emisión retardada de tokens cualesquiera
                (Complete(value), _) => break Ok(std::mem::replace(value, Plus)),

                (Operator(operator), next) => match next.and_then(|c| extend(operator, c)) {
                    Some(extended) => self.state = Complete(extended),
                    None => break Ok(std::mem::replace(operator, Plus)),
                },

                (State::Slash, Some('/')) => self.state = Comment,
                (State::Slash, Some('*')) => self.state = BlockComment(false),
                (State::Slash, _) => break Ok(Token::Slash),

                // Los comentarios descartan la línea donde ocurren
                (Comment, Some('\n')) => self.state = Start,
                (Comment, Some(_)) => (),
                (Comment, None) => self.state = Start,

                (BlockComment(_), None) => break Err(LexerError::UnterminatedComment),
                (BlockComment(true), Some('/')) => self.state = Start,
                (BlockComment(star), Some(c)) => *star = c == '*',

                (Integer(digits), Some(digit)) if digit.is_ascii_digit() => digits.push(digit),

                // Si sigue algo que no es un dígito, la constante ha terminado
                (Integer(digits), _) => match digits.parse::<i32>() {
                    Ok(_) => break Ok(IntLiteral(std::mem::take(digits).into())),
                    Err(_) => break Err(LexerError::IntOverflow),
                },

                (Quoted { quote, .. }, None | Some('\n')) => {
                    break Err(LexerError::Unterminated(*quote))
                }

                (Quoted { text, escaped, .. }, Some(c)) if *escaped => {
                    text.push(c);
                    *escaped = false;
                }

                (Quoted { text, quote, escaped }, Some(c)) => {
                    text.push(c);

                    if c == '\\' {
                        *escaped = true;
                    } else if c == *quote {
                        let text: Rc<str> = std::mem::take(text).into();
                        self.state = match c {
                            '\'' => Complete(CharLiteral(text)),
                            _ => Complete(StringLiteral(text)),
                        };
                    }
                }

                // Extensión de términos
                (Word(word), Some(c)) if is_word_char(c) => word.push(c),

                // Si sigue algo que no puede formar parte del término, ha terminado
                (Word(word), _) => {
                    if let Ok(keyword) = self::Keyword::from_str(word) {
                        break Ok(Keyword(keyword));
                    } else {
                        break Ok(Id(Identifier(std::mem::take(word).into())));
                    }
                }
            }

            // Se consume el carácter que se observó con lookahead anteriormente
            if let Some(Ok((_, next_position))) = self.source.next() {
                last_accepted = std::mem::replace(&mut self.next, next_position);
            }
        };

        token.map(|token| Some((token, last_accepted)))
    }
}

impl<S: InputStream> Iterator for Lexer<S> {
    type Item = Result<Located<Token>, Located<LexerError>>;

    fn next(&mut self) -> Option<Self::Item> {
        match self.lex() {
            Ok(None) => None,
            Ok(Some((token, last_accepted))) => {
                self.state = State::Start;

                let location = Location::span(self.start.clone(), &last_accepted);
                Some(Ok(Located::at(token, location)))
            }

            Err(error) => {
                self.state = State::Error;
                Some(Err(Located::at(error, self.next.clone())))
            }
        }
    }
}

/// Segundo carácter de un operador de dos caracteres.
fn extend(operator: &Token, next: char) -> Option<Token> {
    let extended = match (operator, next) {
        (Token::Assign, '=') => Token::Equal,
        (Token::Not, '=') => Token::NotEqual,
        (Token::Less, '=') => Token::LessOrEqual,
        (Token::Greater, '=') => Token::GreaterOrEqual,
        (Token::Minus, '>') => Token::Arrow,
        _ => return None,
    };

    Some(extended)
}

/// Determina si un carácter puede pertenecer a un término.
fn is_word_char(c: char) -> bool {
    c.is_ascii_alphanumeric() || c == '_'
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::source;

    fn tokens(text: &str) -> Vec<Token> {
        let (start, stream) = source::consume(text.as_bytes(), 0, "test.oc");
        Lexer::new(start, stream)
            .try_exhaustive()
            .unwrap()
            .into_iter()
            .map(Located::into_inner)
            .collect()
    }

    #[test]
    fn operators_take_the_longest_match() {
        use Token::*;

        assert_eq!(
            tokens("a->b == c != !d <= e >= f = g < h > i - j"),
            vec![
                Id(Identifier("a".into())),
                Arrow,
                Id(Identifier("b".into())),
                Equal,
                Id(Identifier("c".into())),
                NotEqual,
                Not,
                Id(Identifier("d".into())),
                LessOrEqual,
                Id(Identifier("e".into())),
                GreaterOrEqual,
                Id(Identifier("f".into())),
                Assign,
                Id(Identifier("g".into())),
                Less,
                Id(Identifier("h".into())),
                Greater,
                Id(Identifier("i".into())),
                Minus,
                Id(Identifier("j".into())),
            ]
        );
    }

    #[test]
    fn comments_and_directives_are_skipped() {
        let found = tokens("#include \"oclib.h\"\nint /* x */ y; // z\n  # also\n 4 / 2");
        assert_eq!(
            found,
            vec![
                Token::Keyword(Keyword::Int),
                Token::Id(Identifier("y".into())),
                Token::Semicolon,
                Token::IntLiteral("4".into()),
                Token::Slash,
                Token::IntLiteral("2".into()),
            ]
        );
    }

    #[test]
    fn literals_keep_their_lexemes() {
        assert_eq!(
            tokens(r#"'\n' "a \"b\"" 042"#),
            vec![
                Token::CharLiteral(r"'\n'".into()),
                Token::StringLiteral(r#""a \"b\"""#.into()),
                Token::IntLiteral("042".into()),
            ]
        );
    }

    #[test]
    fn errors_are_collected() {
        let (start, stream) = source::consume("int $;\n\"open\nint 99999999999;".as_bytes(), 0, "x");
        let errors = Lexer::new(start, stream).try_exhaustive().unwrap_err();

        assert_eq!(errors.len(), 3);
        assert!(matches!(errors[0].val(), LexerError::BadChar('$')));
        assert!(matches!(errors[1].val(), LexerError::Unterminated('"')));
        assert!(matches!(errors[2].val(), LexerError::IntOverflow));
    }
}
