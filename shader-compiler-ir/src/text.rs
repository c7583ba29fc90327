// SPDX-License-Identifier: LGPL-2.1-or-later
// See Notices.txt for copyright information

//! conversion from/to text

use crate::info::{SystemValue, TessPrimitiveMode, TessSpacing};
use crate::program::{BinaryOp, Instruction, Op, Program, Resource, ValueId};
use crate::stage::ShaderStage;
use hashbrown::HashSet;
use std::fmt;
use std::str::FromStr;
use thiserror::Error;

/// a position in program text
#[derive(Copy, Clone, Debug, Eq, PartialEq, Hash)]
pub struct TextLocation {
    /// 1-based line number
    pub line_number: usize,
    /// 1-based column number
    pub column_number: usize,
}

impl fmt::Display for TextLocation {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "{}:{}", self.line_number, self.column_number)
    }
}

/// error from parsing program text
#[derive(Clone, Debug, Eq, PartialEq, Error)]
#[error("{location}: error: {message}")]
pub struct ParseError {
    /// where the error occurred
    pub location: TextLocation,
    /// what went wrong
    pub message: String,
}

impl fmt::Display for Resource {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match *self {
            Resource::Descriptor { set, binding } => write!(f, "descriptor({},{})", set, binding),
            Resource::Surface(index) => write!(f, "surface({})", index),
            Resource::Indirect {
                set,
                descriptor_offset,
            } => write!(f, "indirect({},{})", set, descriptor_offset),
            Resource::PushConstant => write!(f, "push_constant"),
            Resource::Shared => write!(f, "shared"),
        }
    }
}

impl fmt::Display for Op {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            Op::Constant(value) => write!(f, "const {}", value),
            Op::Copy(value) => write!(f, "copy {}", value),
            Op::Binary(op, lhs, rhs) => write!(f, "{} {} {}", op.name(), lhs, rhs),
            Op::LoadInput { slot } => write!(f, "load_input {}", slot),
            Op::StoreOutput { slot, value } => write!(f, "store_output {} {}", slot, value),
            Op::LoadPatchInput { slot } => write!(f, "load_patch_input {}", slot),
            Op::StorePatchOutput { slot, value } => {
                write!(f, "store_patch_output {} {}", slot, value)
            }
            Op::LoadSystemValue(value) => write!(f, "load_system_value {}", value.name()),
            Op::Load { resource, offset } => write!(f, "load {} {}", resource, offset),
            Op::Store {
                resource,
                offset,
                value,
            } => write!(f, "store {} {} {}", resource, offset, value),
            Op::Discard => write!(f, "discard"),
            Op::Terminate => write!(f, "terminate"),
            Op::Barrier => write!(f, "barrier"),
            Op::TraceRay { payload } => write!(f, "trace_ray {}", payload),
            Op::ReportIntersection { hit_t } => write!(f, "report_intersection {}", hit_t),
            Op::IgnoreIntersection => write!(f, "ignore_intersection"),
            Op::ExecuteCallable { data } => write!(f, "execute_callable {}", data),
            Op::RayQuery { operand } => write!(f, "ray_query {}", operand),
        }
    }
}

impl fmt::Display for Instruction {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        if let Some(result) = self.result {
            write!(f, "{} = ", result)?;
        }
        write!(f, "{}", self.op)
    }
}

impl fmt::Display for Program {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        writeln!(f, "shader {} {:?}", self.stage, self.entry_point)?;
        let info = &self.info;
        if info.workgroup_size != [0; 3] {
            let [x, y, z] = info.workgroup_size;
            writeln!(f, ".workgroup_size {} {} {}", x, y, z)?;
        }
        if info.shared_memory_size != 0 {
            writeln!(f, ".shared_memory {}", info.shared_memory_size)?;
        }
        if info.tess.vertices_out != 0 {
            writeln!(f, ".tess_vertices_out {}", info.tess.vertices_out)?;
        }
        if info.tess.spacing != TessSpacing::Unspecified {
            writeln!(f, ".tess_spacing {}", info.tess.spacing.name())?;
        }
        if info.tess.primitive_mode != TessPrimitiveMode::Unspecified {
            writeln!(f, ".tess_primitive_mode {}", info.tess.primitive_mode.name())?;
        }
        if info.tess.ccw {
            writeln!(f, ".tess_ccw")?;
        }
        if info.tess.point_mode {
            writeln!(f, ".tess_point_mode")?;
        }
        if info.per_view_outputs != 0 {
            writeln!(f, ".per_view_outputs {:#x}", info.per_view_outputs)?;
        }
        if info.separate_shader {
            writeln!(f, ".separate_shader")?;
        }
        for instruction in &self.instructions {
            writeln!(f, "{}", instruction)?;
        }
        Ok(())
    }
}

struct Token<'a> {
    text: &'a str,
    location: TextLocation,
}

struct Line<'a> {
    tokens: Vec<Token<'a>>,
    next: usize,
    end: TextLocation,
}

fn error_at(location: TextLocation, message: impl Into<String>) -> ParseError {
    ParseError {
        location,
        message: message.into(),
    }
}

impl<'a> Line<'a> {
    fn new(line_number: usize, text: &'a str) -> Self {
        let text = match text.find('#') {
            Some(comment_start) => &text[..comment_start],
            None => text,
        };
        let mut tokens = Vec::new();
        let mut start = None;
        for (index, ch) in text.char_indices().chain(Some((text.len(), ' '))) {
            match (start, ch.is_whitespace()) {
                (None, false) => start = Some(index),
                (Some(token_start), true) => {
                    tokens.push(Token {
                        text: &text[token_start..index],
                        location: TextLocation {
                            line_number,
                            column_number: text[..token_start].chars().count() + 1,
                        },
                    });
                    start = None;
                }
                _ => {}
            }
        }
        Line {
            tokens,
            next: 0,
            end: TextLocation {
                line_number,
                column_number: text.chars().count() + 1,
            },
        }
    }
    fn is_empty(&self) -> bool {
        self.tokens.is_empty()
    }
    fn peek(&self) -> Option<&Token<'a>> {
        self.tokens.get(self.next)
    }
    fn location(&self) -> TextLocation {
        self.peek().map(|token| token.location).unwrap_or(self.end)
    }
    fn next_token(&mut self, what: &str) -> Result<Token<'a>, ParseError> {
        match self.tokens.get(self.next) {
            Some(token) => {
                self.next += 1;
                Ok(Token {
                    text: token.text,
                    location: token.location,
                })
            }
            None => Err(error_at(self.end, format!("expected {}", what))),
        }
    }
    fn parse_number<T: FromStr>(&mut self, what: &str) -> Result<T, ParseError> {
        let token = self.next_token(what)?;
        parse_number_text(token.text)
            .ok_or_else(|| error_at(token.location, format!("invalid {}: {}", what, token.text)))
    }
    fn parse_value(&mut self) -> Result<ValueId, ParseError> {
        let token = self.next_token("value")?;
        token
            .text
            .strip_prefix('%')
            .and_then(|v| v.parse().ok())
            .map(ValueId)
            .ok_or_else(|| error_at(token.location, format!("invalid value: {}", token.text)))
    }
    fn parse_resource(&mut self) -> Result<Resource, ParseError> {
        let token = self.next_token("resource")?;
        let invalid = || error_at(token.location, format!("invalid resource: {}", token.text));
        match token.text {
            "push_constant" => return Ok(Resource::PushConstant),
            "shared" => return Ok(Resource::Shared),
            _ => {}
        }
        let open = token.text.find('(').ok_or_else(invalid)?;
        let arguments = token.text[open + 1..]
            .strip_suffix(')')
            .ok_or_else(invalid)?
            .split(',')
            .map(|v| v.trim().parse::<u32>().map_err(|_| invalid()))
            .collect::<Result<Vec<_>, _>>()?;
        match (&token.text[..open], &*arguments) {
            ("descriptor", &[set, binding]) => Ok(Resource::Descriptor { set, binding }),
            ("surface", &[index]) => Ok(Resource::Surface(index)),
            ("indirect", &[set, descriptor_offset]) => Ok(Resource::Indirect {
                set,
                descriptor_offset,
            }),
            _ => Err(invalid()),
        }
    }
    fn finish(&self) -> Result<(), ParseError> {
        match self.peek() {
            Some(token) => Err(error_at(
                token.location,
                format!("unexpected text: {}", token.text),
            )),
            None => Ok(()),
        }
    }
}

fn parse_number_text<T: FromStr>(text: &str) -> Option<T> {
    if let Some(hex) = text.strip_prefix("0x") {
        let value = u64::from_str_radix(hex, 16).ok()?;
        value.to_string().parse().ok()
    } else {
        text.parse().ok()
    }
}

fn parse_op(line: &mut Line) -> Result<Op, ParseError> {
    let keyword = line.next_token("operation")?;
    let op = match keyword.text {
        "const" => Op::Constant(line.parse_number("constant")?),
        "copy" => Op::Copy(line.parse_value()?),
        "load_input" => Op::LoadInput {
            slot: line.parse_number("slot")?,
        },
        "store_output" => Op::StoreOutput {
            slot: line.parse_number("slot")?,
            value: line.parse_value()?,
        },
        "load_patch_input" => Op::LoadPatchInput {
            slot: line.parse_number("slot")?,
        },
        "store_patch_output" => Op::StorePatchOutput {
            slot: line.parse_number("slot")?,
            value: line.parse_value()?,
        },
        "load_system_value" => {
            let token = line.next_token("system value")?;
            Op::LoadSystemValue(SystemValue::from_name(token.text).ok_or_else(|| {
                error_at(
                    token.location,
                    format!("unknown system value: {}", token.text),
                )
            })?)
        }
        "load" => Op::Load {
            resource: line.parse_resource()?,
            offset: line.parse_value()?,
        },
        "store" => Op::Store {
            resource: line.parse_resource()?,
            offset: line.parse_value()?,
            value: line.parse_value()?,
        },
        "discard" => Op::Discard,
        "terminate" => Op::Terminate,
        "barrier" => Op::Barrier,
        "trace_ray" => Op::TraceRay {
            payload: line.parse_value()?,
        },
        "report_intersection" => Op::ReportIntersection {
            hit_t: line.parse_value()?,
        },
        "ignore_intersection" => Op::IgnoreIntersection,
        "execute_callable" => Op::ExecuteCallable {
            data: line.parse_value()?,
        },
        "ray_query" => Op::RayQuery {
            operand: line.parse_value()?,
        },
        text => match BinaryOp::from_name(text) {
            Some(op) => Op::Binary(op, line.parse_value()?, line.parse_value()?),
            None => {
                return Err(error_at(
                    keyword.location,
                    format!("unknown operation: {}", text),
                ))
            }
        },
    };
    Ok(op)
}

fn parse_directive(program: &mut Program, name: &Token, line: &mut Line) -> Result<(), ParseError> {
    let info = &mut program.info;
    match name.text {
        ".workgroup_size" => {
            info.workgroup_size = [
                line.parse_number("workgroup size")?,
                line.parse_number("workgroup size")?,
                line.parse_number("workgroup size")?,
            ]
        }
        ".shared_memory" => info.shared_memory_size = line.parse_number("shared memory size")?,
        ".tess_vertices_out" => info.tess.vertices_out = line.parse_number("vertex count")?,
        ".tess_spacing" => {
            let token = line.next_token("spacing")?;
            info.tess.spacing = TessSpacing::from_name(token.text).ok_or_else(|| {
                error_at(token.location, format!("unknown spacing: {}", token.text))
            })?;
        }
        ".tess_primitive_mode" => {
            let token = line.next_token("primitive mode")?;
            info.tess.primitive_mode =
                TessPrimitiveMode::from_name(token.text).ok_or_else(|| {
                    error_at(
                        token.location,
                        format!("unknown primitive mode: {}", token.text),
                    )
                })?;
        }
        ".tess_ccw" => info.tess.ccw = true,
        ".tess_point_mode" => info.tess.point_mode = true,
        ".per_view_outputs" => info.per_view_outputs = line.parse_number("output mask")?,
        ".separate_shader" => info.separate_shader = true,
        text => {
            return Err(error_at(
                name.location,
                format!("unknown directive: {}", text),
            ))
        }
    }
    Ok(())
}

fn parse_header(line: &mut Line) -> Result<Program, ParseError> {
    let keyword = line.next_token("`shader`")?;
    if keyword.text != "shader" {
        return Err(error_at(keyword.location, "expected `shader`"));
    }
    let stage_token = line.next_token("shader stage")?;
    let stage = ShaderStage::from_name(stage_token.text).ok_or_else(|| {
        error_at(
            stage_token.location,
            format!("unknown shader stage: {}", stage_token.text),
        )
    })?;
    let entry_token = line.next_token("entry point name")?;
    let entry_point = entry_token
        .text
        .strip_prefix('"')
        .and_then(|v| v.strip_suffix('"'))
        .filter(|v| !v.is_empty())
        .ok_or_else(|| error_at(entry_token.location, "expected quoted entry point name"))?;
    line.finish()?;
    Ok(Program::new(stage, entry_point))
}

impl Program {
    /// parse the text form produced by `Display`
    ///
    /// derived shader info is recomputed after parsing.
    pub fn parse(text: &str) -> Result<Program, ParseError> {
        let mut lines = text
            .lines()
            .enumerate()
            .map(|(index, line)| Line::new(index + 1, line))
            .filter(|line| !line.is_empty());
        let mut header = lines.next().ok_or_else(|| {
            error_at(
                TextLocation {
                    line_number: 1,
                    column_number: 1,
                },
                "expected `shader`",
            )
        })?;
        let mut program = parse_header(&mut header)?;
        let mut defined = HashSet::new();
        for mut line in lines {
            let location = line.location();
            let first = line.next_token("instruction")?;
            if first.text.starts_with('.') {
                if !program.instructions.is_empty() {
                    return Err(error_at(location, "directive after first instruction"));
                }
                parse_directive(&mut program, &first, &mut line)?;
                line.finish()?;
                continue;
            }
            let result = if first.text.starts_with('%') {
                line.next -= 1;
                let result = line.parse_value()?;
                let equals = line.next_token("`=`")?;
                if equals.text != "=" {
                    return Err(error_at(equals.location, "expected `=`"));
                }
                Some(result)
            } else {
                line.next -= 1;
                None
            };
            let op_location = line.location();
            let op = parse_op(&mut line)?;
            line.finish()?;
            let mut undefined = None;
            op.visit_operands(|v| {
                if undefined.is_none() && !defined.contains(&v) {
                    undefined = Some(v);
                }
            });
            if let Some(v) = undefined {
                return Err(error_at(op_location, format!("use of undefined value {}", v)));
            }
            match (result, op.has_result()) {
                (Some(result), true) => {
                    if !defined.insert(result) {
                        return Err(error_at(location, format!("{} redefined", result)));
                    }
                    program.reserve_value(result);
                }
                (None, false) => {}
                (Some(_), false) => {
                    return Err(error_at(location, "operation doesn't define a value"))
                }
                (None, true) => return Err(error_at(location, "operation result not named")),
            }
            program.instructions.push(Instruction { result, op });
        }
        program.gather_info();
        Ok(program)
    }
}

impl FromStr for Program {
    type Err = ParseError;
    fn from_str(text: &str) -> Result<Program, ParseError> {
        Program::parse(text)
    }
}
