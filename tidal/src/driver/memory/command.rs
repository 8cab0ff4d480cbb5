use super::catalog::ColumnDef;
use crate::{
    lexer::{Lexer, LexerError, Token},
    Date, Interval, Numeric, Time, Timestamp, Type, Value,
};

#[derive(Debug, thiserror::Error)]
pub(super) enum CommandError {
    #[error("Unexpected token {0}")]
    UnexpectedToken(String),

    #[error("Empty statement")]
    Empty,

    #[error("Expected a single statement")]
    MultipleStatements,

    #[error("Lexer error: {0}")]
    Lexer(#[from] LexerError),

    #[error("Invalid literal: {0}")]
    InvalidLiteral(String),
}

impl CommandError {
    pub fn sqlstate(&self) -> &'static str {
        match self {
            Self::InvalidLiteral(_) => "22007",
            Self::UnexpectedToken(_) | Self::Empty | Self::MultipleStatements | Self::Lexer(_) => {
                "42000"
            }
        }
    }
}

type CommandResult<T> = std::result::Result<T, CommandError>;

#[derive(Debug, Clone)]
pub(super) enum Command {
    CreateTable {
        name: String,
        if_not_exists: bool,
        columns: Vec<ColumnDef>,
    },
    DropTable {
        name: String,
        if_exists: bool,
    },
    Insert {
        table: String,
        columns: Option<Vec<String>>,
        rows: Vec<Vec<Operand>>,
    },
    Select {
        table: String,
        projection: Projection,
        filter: Vec<Condition>,
    },
    Update {
        table: String,
        sets: Vec<(String, Operand)>,
        filter: Vec<Condition>,
    },
    Delete {
        table: String,
        filter: Vec<Condition>,
    },
}

#[derive(Debug, Clone)]
pub(super) enum Projection {
    All,
    Columns(Vec<String>),
}

#[derive(Debug, Clone)]
pub(super) enum Operand {
    /// `None` is the NULL literal.
    Literal(Option<Value>),
    /// 0-based position of a `?` placeholder.
    Parameter(usize),
}

impl Operand {
    pub fn resolve(&self, params: &[Option<Value>]) -> Option<Value> {
        match self {
            Self::Literal(value) => value.clone(),
            Self::Parameter(i) => params.get(*i).cloned().flatten(),
        }
    }
}

#[derive(Debug, Clone)]
pub(super) enum Condition {
    Eq(String, Operand),
    IsNull(String),
    IsNotNull(String),
}

/// Reads one statement of the `memory` dialect.
pub(super) struct Parser<'a> {
    lexer: Lexer<'a>,
    param_count: usize,
}

impl<'a> Parser<'a> {
    pub fn new(sql: &'a str) -> Self {
        Self {
            lexer: Lexer::new(sql),
            param_count: 0,
        }
    }

    /// Parses the statement and returns it with its number of parameters.
    pub fn parse(mut self) -> CommandResult<(Command, usize)> {
        while self.lexer.consume_if_eq(Token::Semicolon)? {}
        if *self.lexer.peek()? == Token::Eof {
            return Err(CommandError::Empty);
        }
        let command = self.parse_command()?;
        while self.lexer.consume_if_eq(Token::Semicolon)? {}
        match self.lexer.consume()? {
            Token::Eof => Ok((command, self.param_count)),
            _ => Err(CommandError::MultipleStatements),
        }
    }

    fn parse_command(&mut self) -> CommandResult<Command> {
        match self.lexer.consume()? {
            Token::Create => self.parse_create_table(),
            Token::Drop => self.parse_drop_table(),
            Token::Insert => self.parse_insert(),
            Token::Select => self.parse_select(),
            Token::Update => self.parse_update(),
            Token::Delete => self.parse_delete(),
            token => Err(unexpected(&token)),
        }
    }

    fn parse_create_table(&mut self) -> CommandResult<Command> {
        self.expect(Token::Table)?;
        let if_not_exists = self.parse_if(true)?;
        let name = self.expect_identifier()?;
        self.expect(Token::LeftParen)?;
        let columns = self.parse_comma_separated(Self::parse_column_def)?;
        self.expect(Token::RightParen)?;
        Ok(Command::CreateTable {
            name,
            if_not_exists,
            columns,
        })
    }

    fn parse_drop_table(&mut self) -> CommandResult<Command> {
        self.expect(Token::Table)?;
        let if_exists = self.parse_if(false)?;
        let name = self.expect_identifier()?;
        Ok(Command::DropTable { name, if_exists })
    }

    /// `IF [NOT] EXISTS`
    fn parse_if(&mut self, not: bool) -> CommandResult<bool> {
        if !self.lexer.consume_if_eq(Token::If)? {
            return Ok(false);
        }
        if not {
            self.expect(Token::Not)?;
        }
        self.expect(Token::Exists)?;
        Ok(true)
    }

    fn parse_column_def(&mut self) -> CommandResult<ColumnDef> {
        let name = self.expect_identifier()?;
        let mut column = ColumnDef {
            name,
            datatype: Type::Unknown,
            size: None,
            precision: None,
            scale: None,
            nullable: true,
        };
        self.parse_type(&mut column)?;
        loop {
            if self.lexer.consume_if_eq(Token::Not)? {
                self.expect(Token::Null)?;
                column.nullable = false;
            } else if !self.lexer.consume_if_eq(Token::Null)? {
                break;
            }
        }
        Ok(column)
    }

    fn parse_type(&mut self, column: &mut ColumnDef) -> CommandResult<()> {
        let token = self.lexer.consume()?;
        column.datatype = match token {
            Token::Tinyint => self.parse_unsigned(Type::Int8, Type::UInt8)?,
            Token::Smallint => self.parse_unsigned(Type::Int16, Type::UInt16)?,
            Token::Int | Token::Integer => self.parse_unsigned(Type::Int32, Type::UInt32)?,
            Token::Bigint => self.parse_unsigned(Type::Int64, Type::UInt64)?,
            Token::Boolean => Type::Boolean,
            Token::Char => {
                column.size = Some(self.parse_length()?.unwrap_or(1));
                Type::Char
            }
            Token::Varchar => {
                column.size = self.parse_length()?;
                Type::VarChar
            }
            Token::Text => Type::VarChar,
            Token::Blob => Type::Blob,
            Token::Memo | Token::Clob => Type::Memo,
            Token::Numeric | Token::Decimal => {
                let mut precision = u32::from(Numeric::MAX_SCALE);
                let mut scale = 0;
                if self.lexer.consume_if_eq(Token::LeftParen)? {
                    precision = self.expect_u32()?;
                    if self.lexer.consume_if_eq(Token::Comma)? {
                        scale = self.expect_u32()?;
                    }
                    self.expect(Token::RightParen)?;
                }
                let scale = u8::try_from(scale)
                    .ok()
                    .filter(|s| *s <= Numeric::MAX_SCALE && u32::from(*s) <= precision)
                    .ok_or_else(|| unexpected(&Token::IntegerLiteral(scale.into())))?;
                column.precision = Some(precision);
                column.scale = Some(scale);
                Type::Numeric
            }
            Token::Real | Token::Float => Type::Float,
            Token::Double => {
                self.lexer.consume_if_eq(Token::Precision)?;
                Type::Double
            }
            Token::Date => Type::Date,
            Token::Time => Type::Time,
            Token::Timestamp => Type::Timestamp,
            Token::Interval => Type::Interval,
            token => return Err(unexpected(&token)),
        };
        Ok(())
    }

    fn parse_unsigned(&mut self, signed: Type, unsigned: Type) -> CommandResult<Type> {
        Ok(if self.lexer.consume_if_eq(Token::Unsigned)? {
            unsigned
        } else {
            signed
        })
    }

    fn parse_length(&mut self) -> CommandResult<Option<usize>> {
        if !self.lexer.consume_if_eq(Token::LeftParen)? {
            return Ok(None);
        }
        let length = self.expect_u32()?;
        self.expect(Token::RightParen)?;
        Ok(Some(length as usize))
    }

    fn parse_insert(&mut self) -> CommandResult<Command> {
        self.expect(Token::Into)?;
        let table = self.expect_identifier()?;
        let columns = if self.lexer.consume_if_eq(Token::LeftParen)? {
            let columns = self.parse_comma_separated(Self::expect_identifier)?;
            self.expect(Token::RightParen)?;
            Some(columns)
        } else {
            None
        };
        self.expect(Token::Values)?;
        let rows = self.parse_comma_separated(|parser| {
            parser.expect(Token::LeftParen)?;
            let row = parser.parse_comma_separated(Self::parse_operand)?;
            parser.expect(Token::RightParen)?;
            Ok(row)
        })?;
        Ok(Command::Insert {
            table,
            columns,
            rows,
        })
    }

    fn parse_select(&mut self) -> CommandResult<Command> {
        let projection = if self.lexer.consume_if_eq(Token::Asterisk)? {
            Projection::All
        } else {
            Projection::Columns(self.parse_comma_separated(Self::expect_identifier)?)
        };
        self.expect(Token::From)?;
        let table = self.expect_identifier()?;
        let filter = self.parse_where()?;
        Ok(Command::Select {
            table,
            projection,
            filter,
        })
    }

    fn parse_update(&mut self) -> CommandResult<Command> {
        let table = self.expect_identifier()?;
        self.expect(Token::Set)?;
        let sets = self.parse_comma_separated(|parser| {
            let column = parser.expect_identifier()?;
            parser.expect(Token::Eq)?;
            Ok((column, parser.parse_operand()?))
        })?;
        let filter = self.parse_where()?;
        Ok(Command::Update {
            table,
            sets,
            filter,
        })
    }

    fn parse_delete(&mut self) -> CommandResult<Command> {
        self.expect(Token::From)?;
        let table = self.expect_identifier()?;
        let filter = self.parse_where()?;
        Ok(Command::Delete { table, filter })
    }

    fn parse_where(&mut self) -> CommandResult<Vec<Condition>> {
        let mut conditions = Vec::new();
        if !self.lexer.consume_if_eq(Token::Where)? {
            return Ok(conditions);
        }
        loop {
            let column = self.expect_identifier()?;
            let condition = if self.lexer.consume_if_eq(Token::Is)? {
                if self.lexer.consume_if_eq(Token::Not)? {
                    self.expect(Token::Null)?;
                    Condition::IsNotNull(column)
                } else {
                    self.expect(Token::Null)?;
                    Condition::IsNull(column)
                }
            } else {
                self.expect(Token::Eq)?;
                Condition::Eq(column, self.parse_operand()?)
            };
            conditions.push(condition);
            if !self.lexer.consume_if_eq(Token::And)? {
                break;
            }
        }
        Ok(conditions)
    }

    fn parse_operand(&mut self) -> CommandResult<Operand> {
        let value = match self.lexer.consume()? {
            Token::Parameter => {
                self.param_count += 1;
                return Ok(Operand::Parameter(self.param_count - 1));
            }
            Token::Null => None,
            Token::True => Some(Value::Boolean(true)),
            Token::False => Some(Value::Boolean(false)),
            Token::String(s) => Some(Value::Text(s)),
            Token::IntegerLiteral(i) => Some(Value::Int64(i)),
            Token::NumericLiteral(n) => Some(Value::Numeric(n)),
            Token::Minus => Some(match self.lexer.consume()? {
                Token::IntegerLiteral(i) => Value::Int64(-i),
                Token::NumericLiteral(n) => Value::Numeric(-n),
                token => return Err(unexpected(&token)),
            }),
            Token::Date => Some(Value::Date(self.parse_typed_literal::<Date>()?)),
            Token::Time => Some(Value::Time(self.parse_typed_literal::<Time>()?)),
            Token::Timestamp => Some(Value::Timestamp(
                self.parse_typed_literal::<Timestamp>()?,
            )),
            Token::Interval => Some(Value::Interval(self.parse_typed_literal::<Interval>()?)),
            token => return Err(unexpected(&token)),
        };
        Ok(Operand::Literal(value))
    }

    /// The quoted text following `DATE`, `TIME`, `TIMESTAMP` or `INTERVAL`.
    fn parse_typed_literal<T>(&mut self) -> CommandResult<T>
    where
        T: std::str::FromStr,
        T::Err: std::fmt::Display,
    {
        match self.lexer.consume()? {
            Token::String(s) => s
                .parse()
                .map_err(|e: T::Err| CommandError::InvalidLiteral(e.to_string())),
            token => Err(unexpected(&token)),
        }
    }

    fn parse_comma_separated<T, F>(&mut self, mut f: F) -> CommandResult<Vec<T>>
    where
        F: FnMut(&mut Self) -> CommandResult<T>,
    {
        let mut items = Vec::new();
        loop {
            items.push(f(self)?);
            if !self.lexer.consume_if_eq(Token::Comma)? {
                break;
            }
        }
        Ok(items)
    }

    fn expect(&mut self, expected: Token) -> CommandResult<()> {
        let actual = self.lexer.consume()?;
        if actual != expected {
            return Err(unexpected(&actual));
        }
        Ok(())
    }

    fn expect_identifier(&mut self) -> CommandResult<String> {
        match self.lexer.consume()? {
            Token::Identifier(ident) => Ok(ident),
            token => Err(unexpected(&token)),
        }
    }

    fn expect_u32(&mut self) -> CommandResult<u32> {
        match self.lexer.consume()? {
            Token::IntegerLiteral(i) => u32::try_from(i)
                .map_err(|_| unexpected(&Token::IntegerLiteral(i))),
            token => Err(unexpected(&token)),
        }
    }
}

fn unexpected(token: &Token) -> CommandError {
    CommandError::UnexpectedToken(format!("{token:?}"))
}

