use std::{
    fmt::{self, Display},
    io::{self, Write},
    rc::Rc,
};

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Label {
    Named(Rc<str>),
    If(u32),
    Then(u32),
    Else(u32),
    Fi(u32),
    While(u32),
    Do(u32),
    Od(u32),
    Str(u32),
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Type {
    Void,
    Int,
    String,
    Struct(Rc<str>),
    Ptr(Rc<str>),
    Array(Box<Type>),
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Operand {
    Temp(u32),
    Name(Rc<str>),
    Literal(Rc<str>),
    Label(Label),
    Field(Box<Operand>, Rc<str>),
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Rvalue {
    Value(Operand),
    Binary(Operand, &'static str, Operand),
    Unary(&'static str, Operand),
    Index(Operand, Operand),
    Call(Rc<str>, Vec<Operand>),
    Malloc(Type, Option<Operand>),
}

/// Condición bajo la cual se toma un salto.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Guard {
    Compare(Operand, &'static str, Operand),
    Holds(Operand),
    Fails(Operand),
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Instruction {
    Function(Type),
    Param(Type, Rc<str>),
    Local(Type, Rc<str>),
    Global(Type, Rc<str>),
    Data(Type, Operand),
    Str(Rc<str>),
    Struct(Rc<str>),
    Field(Type, Rc<str>),
    End,
    Assign(Operand, Rvalue),
    Goto(Label),
    GotoIf(Label, Guard),
    Call(Rc<str>, Vec<Operand>),
    Return(Option<Operand>),
    Nop,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Line {
    pub label: Option<Label>,
    pub instruction: Instruction,
}

/// Programa en IR, una instrucción por línea.
#[derive(Clone, Debug, Default)]
pub struct Listing {
    pub lines: Vec<Line>,
}

impl Listing {
    pub fn write_to<W: Write>(&self, output: &mut W) -> io::Result<()> {
        write!(output, "{}", self)
    }
}

impl Display for Listing {
    fn fmt(&self, fmt: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.lines
            .iter()
            .try_for_each(|line| writeln!(fmt, "{}", line))
    }
}

impl Display for Line {
    fn fmt(&self, fmt: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = self
            .label
            .as_ref()
            .map(|label| format!("{}:", label))
            .unwrap_or_default();

        match self.instruction {
            Instruction::Nop => fmt.write_str(&label),
            _ => write!(fmt, "{:<10}{}", label, self.instruction),
        }
    }
}

impl Display for Label {
    fn fmt(&self, fmt: &mut fmt::Formatter<'_>) -> fmt::Result {
        let (prefix, number) = match self {
            Label::Named(name) => return fmt.write_str(name),
            Label::If(number) => ("if", number),
            Label::Then(number) => ("th", number),
            Label::Else(number) => ("el", number),
            Label::Fi(number) => ("fi", number),
            Label::While(number) => ("wh", number),
            Label::Do(number) => ("do", number),
            Label::Od(number) => ("od", number),
            Label::Str(number) => ("s", number),
        };

        write!(fmt, ".{}{}", prefix, number)
    }
}

impl Display for Type {
    fn fmt(&self, fmt: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Type::Void => fmt.write_str("void"),
            Type::Int => fmt.write_str("int"),
            Type::String => fmt.write_str("string"),
            Type::Struct(tag) => fmt.write_str(tag),
            Type::Ptr(tag) => write!(fmt, "ptr<struct {}>", tag),
            Type::Array(element) => write!(fmt, "array<{}>", element),
        }
    }
}

impl Display for Operand {
    fn fmt(&self, fmt: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Operand::Temp(number) => write!(fmt, "$t{}", number),
            Operand::Name(name) | Operand::Literal(name) => fmt.write_str(name),
            Operand::Label(label) => write!(fmt, "{}", label),
            Operand::Field(base, field) => write!(fmt, "{}->{}", base, field),
        }
    }
}

impl Display for Rvalue {
    fn fmt(&self, fmt: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Rvalue::Value(value) => write!(fmt, "{}", value),
            Rvalue::Binary(left, operator, right) => write!(fmt, "{} {} {}", left, operator, right),
            Rvalue::Unary(operator, operand) => write!(fmt, "{} {}", operator, operand),
            Rvalue::Index(base, index) => write!(fmt, "{}[{}]", base, index),
            Rvalue::Call(function, arguments) => {
                write!(fmt, "call {} ", function)?;
                arguments_list(fmt, arguments)
            }

            Rvalue::Malloc(of, None) => write!(fmt, "malloc {}", of),
            Rvalue::Malloc(of, Some(size)) => write!(fmt, "malloc {} {}", of, size),
        }
    }
}

impl Display for Guard {
    fn fmt(&self, fmt: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Guard::Compare(left, operator, right) => write!(fmt, "{} {} {}", left, operator, right),
            Guard::Holds(operand) => write!(fmt, "{}", operand),
            Guard::Fails(operand) => write!(fmt, "not {}", operand),
        }
    }
}

impl Display for Instruction {
    fn fmt(&self, fmt: &mut fmt::Formatter<'_>) -> fmt::Result {
        use Instruction::*;

        match self {
            Function(Type::Void) => fmt.write_str(".function"),
            Function(returns) => write!(fmt, ".function {}", returns),
            Param(of, name) => write!(fmt, ".param {} {}", of, name),
            Local(of, name) => write!(fmt, ".local {} {}", of, name),
            Global(of, name) => write!(fmt, ".global {} {}", of, name),
            Data(of, value) => write!(fmt, ".global {} {}", of, value),
            Str(text) => fmt.write_str(text),
            Struct(tag) => write!(fmt, ".struct {}", tag),
            Field(of, name) => write!(fmt, ".field {} {}", of, name),
            End => fmt.write_str(".end"),
            Assign(target, value) => write!(fmt, "{} = {}", target, value),
            Goto(label) => write!(fmt, "goto {}", label),
            GotoIf(label, guard) => write!(fmt, "goto {} if {}", label, guard),
            Call(function, arguments) => {
                write!(fmt, "call {} ", function)?;
                arguments_list(fmt, arguments)
            }

            Return(None) => fmt.write_str("return"),
            Return(Some(value)) => write!(fmt, "return {}", value),
            Nop => Ok(()),
        }
    }
}

fn arguments_list(fmt: &mut fmt::Formatter<'_>, arguments: &[Operand]) -> fmt::Result {
    fmt.write_str("(")?;
    for (position, argument) in arguments.iter().enumerate() {
        if position > 0 {
            fmt.write_str(", ")?;
        }

        write!(fmt, "{}", argument)?;
    }

    fmt.write_str(")")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn labels_pad_to_ten_columns() {
        let line = Line {
            label: Some(Label::While(3)),
            instruction: Instruction::GotoIf(
                Label::Od(3),
                Guard::Fails(Operand::Temp(7)),
            ),
        };

        assert_eq!(line.to_string(), ".wh3:     goto .od3 if not $t7");

        let bare = Line {
            label: None,
            instruction: Instruction::Return(None),
        };

        assert_eq!(bare.to_string(), "          return");
    }

    #[test]
    fn types_render_as_declared() {
        let element = Type::Ptr("node".into());
        assert_eq!(Type::Array(Box::new(element)).to_string(), "array<ptr<struct node>>");
        assert_eq!(Instruction::Function(Type::Void).to_string(), ".function");

        let call = Rvalue::Call(
            "f".into(),
            vec![
                Operand::Name("a".into()),
                Operand::Field(Box::new(Operand::Name("p".into())), "next".into()),
            ],
        );

        assert_eq!(call.to_string(), "call f (a, p->next)");
    }
}
