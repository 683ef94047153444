//! The preprocessor driver.
//!
//! Consumes a token stream and re-emits expanded source text for the
//! parser: macros substituted, conditional branches resolved, loops
//! unrolled, and `{…}` expressions evaluated and spliced back in. The
//! driver is pull-based over a cursor; loop bodies are replayed by running
//! the collected body tokens through the same machinery.

use tracing::warn;

use crate::diag::{AsmError, AsmErrorKind, SourceLoc};
use crate::eval::{self, Value};
use crate::macros::MacroTable;
use crate::token::{self, PpDirective, Token, TokenKind};

/// Iteration cap for `.while`; exceeding it is reported as an infinite
/// loop instead of hanging the assembler.
pub const MAX_WHILE_ITERATIONS: usize = 1_000_000;

/// Run the preprocessor over `tokens`, producing expanded source text.
pub fn preprocess(tokens: &[Token]) -> Result<String, AsmError> {
    let mut pp = Preprocessor::new();
    pp.process_tokens(tokens)?;
    pp.finish()
}

#[derive(Debug)]
struct CondFrame {
    /// A branch of this conditional has already been taken.
    condition_met: bool,
    /// Tokens are currently reaching the output.
    currently_active: bool,
    /// `.else` has been seen; further `.elif`/`.else` are errors.
    else_seen: bool,
    opened_at: SourceLoc,
}

#[derive(Debug, Default)]
struct LoopFlags {
    should_break: bool,
    should_continue: bool,
}

struct Cursor<'a> {
    tokens: &'a [Token],
    pos: usize,
}

impl<'a> Cursor<'a> {
    fn new(tokens: &'a [Token]) -> Self {
        Self { tokens, pos: 0 }
    }

    fn at_end(&self) -> bool {
        self.pos >= self.tokens.len()
    }

    fn current(&self) -> Option<&'a Token> {
        self.tokens.get(self.pos)
    }

    fn peek(&self, offset: usize) -> Option<&'a Token> {
        self.tokens.get(self.pos + offset)
    }

    fn bump(&mut self) -> Option<&'a Token> {
        let tok = self.tokens.get(self.pos);
        self.pos += 1;
        tok
    }

    fn advance(&mut self, count: usize) {
        self.pos = (self.pos + count).min(self.tokens.len());
    }

    /// Consume up to and including the next newline.
    fn skip_to_eol(&mut self) {
        while let Some(tok) = self.bump() {
            if tok.kind == TokenKind::Newline {
                break;
            }
        }
    }

    /// Drop a `\`-newline pair if the cursor sits on one.
    fn splice_line(&mut self) -> bool {
        if self.current().map(|t| t.kind.clone()) == Some(TokenKind::Backslash)
            && self.peek(1).map(|t| t.kind.clone()) == Some(TokenKind::Newline)
        {
            self.advance(2);
            true
        } else {
            false
        }
    }
}

struct Preprocessor {
    macros: MacroTable,
    out: String,
    needs_space: bool,
    cond_stack: Vec<CondFrame>,
    loop_flags: Vec<LoopFlags>,
}

impl Preprocessor {
    fn new() -> Self {
        Self {
            macros: MacroTable::new(),
            out: String::new(),
            needs_space: false,
            cond_stack: Vec::new(),
            loop_flags: Vec::new(),
        }
    }

    fn finish(self) -> Result<String, AsmError> {
        if let Some(frame) = self.cond_stack.last() {
            return Err(AsmErrorKind::UnclosedConditional(
                frame.opened_at.line,
            )
            .at(frame.opened_at.clone()));
        }
        Ok(self.out)
    }

    fn process_tokens(&mut self, tokens: &[Token]) -> Result<(), AsmError> {
        let mut cur = Cursor::new(tokens);
        self.process_stream(&mut cur)
    }

    fn process_stream(&mut self, cur: &mut Cursor) -> Result<(), AsmError> {
        while !cur.at_end() {
            if self
                .loop_flags
                .last()
                .is_some_and(|f| f.should_break || f.should_continue)
            {
                break;
            }

            if cur.splice_line() {
                continue;
            }

            if !self.conditionally_active() {
                self.skip_conditional_block(cur)?;
                continue;
            }

            let tok = cur.current().expect("not at end");

            if tok.kind == TokenKind::Newline {
                self.append_newline();
                cur.advance(1);
                continue;
            }

            if self.handle_directive(cur)? {
                continue;
            }
            if self.handle_identifier_interpolation(cur)? {
                continue;
            }
            if self.handle_string_interpolation(cur)? {
                continue;
            }
            if self.handle_braced_expression(cur)? {
                continue;
            }
            if self.try_expand_macro(cur) {
                continue;
            }

            let tok = cur.bump().expect("not at end");
            self.append_token(tok);
        }
        Ok(())
    }

    /* Output building *****************************************************/

    fn no_space_before(kind: &TokenKind) -> bool {
        matches!(
            kind,
            TokenKind::Comma
                | TokenKind::Colon
                | TokenKind::RParen
                | TokenKind::RBracket
                | TokenKind::RBrace
                | TokenKind::Newline
        )
    }

    fn no_space_after(kind: &TokenKind) -> bool {
        matches!(
            kind,
            TokenKind::LParen
                | TokenKind::LBracket
                | TokenKind::LBrace
                | TokenKind::Newline
        )
    }

    fn append_token(&mut self, tok: &Token) {
        if self.needs_space && !Self::no_space_before(&tok.kind) {
            self.out.push(' ');
        }

        match &tok.kind {
            TokenKind::Str => {
                self.out.push('"');
                self.out.push_str(&tok.lexeme);
                self.out.push('"');
            }
            TokenKind::Char(_) => {
                self.out.push('\'');
                self.out.push_str(&tok.lexeme);
                self.out.push('\'');
            }
            _ => self.out.push_str(&tok.lexeme),
        }

        self.needs_space = !Self::no_space_after(&tok.kind);
    }

    fn append_newline(&mut self) {
        // Collapse runs of newlines in the output.
        if self.out.ends_with('\n') {
            return;
        }
        self.out.push('\n');
        self.needs_space = false;
    }

    fn append_text(&mut self, text: &str) {
        if self.needs_space && !text.is_empty() {
            self.out.push(' ');
        }
        self.out.push_str(text);
        self.needs_space = true;
    }

    /* Directives **********************************************************/

    fn handle_directive(&mut self, cur: &mut Cursor) -> Result<bool, AsmError> {
        let Some(tok) = cur.current() else {
            return Ok(false);
        };
        let TokenKind::Directive(directive) = tok.kind else {
            return Ok(false);
        };
        let loc = tok.loc.clone();

        match directive {
            PpDirective::Define => self.handle_define(cur)?,
            PpDirective::Undef => self.handle_undef(cur)?,
            PpDirective::If => self.handle_if(cur)?,
            PpDirective::Ifdef => self.handle_ifdef(cur, false)?,
            PpDirective::Ifndef => self.handle_ifdef(cur, true)?,
            PpDirective::Elif => self.handle_elif(cur)?,
            PpDirective::Else => self.handle_else(cur)?,
            PpDirective::Endif => self.handle_endif(cur)?,
            PpDirective::Repeat => self.handle_repeat(cur)?,
            PpDirective::For => self.handle_for(cur)?,
            PpDirective::While => self.handle_while(cur)?,
            PpDirective::EndRepeat => {
                return Err(AsmErrorKind::DanglingLoopEnd(".endrepeat").at(loc))
            }
            PpDirective::EndFor => {
                return Err(AsmErrorKind::DanglingLoopEnd(".endfor").at(loc))
            }
            PpDirective::EndWhile => {
                return Err(AsmErrorKind::DanglingLoopEnd(".endwhile").at(loc))
            }
            PpDirective::Break => self.handle_break_continue(cur, true)?,
            PpDirective::Continue => self.handle_break_continue(cur, false)?,
        }
        Ok(true)
    }

    fn expect_ident<'a>(
        cur: &mut Cursor<'a>,
        after: &'static str,
    ) -> Result<&'a Token, AsmError> {
        match cur.bump() {
            Some(tok) if tok.kind == TokenKind::Ident => Ok(tok),
            Some(tok) => Err(AsmErrorKind::UnexpectedToken {
                expected: after,
                found: format!("'{}'", tok.lexeme),
            }
            .at(tok.loc.clone())),
            None => Err(AsmErrorKind::UnexpectedToken {
                expected: after,
                found: "end of input".into(),
            }
            .at(SourceLoc::default())),
        }
    }

    fn handle_define(&mut self, cur: &mut Cursor) -> Result<(), AsmError> {
        let define_loc = cur.bump().expect("directive token").loc.clone();
        let name = Self::expect_ident(cur, "a macro name")?.lexeme.clone();

        // Replacement tokens run to the end of the logical line. Braced
        // groups are evaluated now, at definition time.
        let mut replacement = Vec::new();
        while !cur.at_end() {
            if cur.splice_line() {
                continue;
            }
            let tok = cur.current().expect("not at end");
            match tok.kind {
                TokenKind::Newline => {
                    cur.advance(1);
                    break;
                }
                TokenKind::LBrace => {
                    let (group, group_loc) =
                        collect_braced(cur, "macro definition")?;
                    let value = eval::evaluate(&group, &self.macros)?;
                    replacement.push(token_from_value(&value, group_loc));
                }
                _ => {
                    replacement.push(tok.clone());
                    cur.advance(1);
                }
            }
        }

        self.macros
            .define(&name, replacement, define_loc.clone())
            .map_err(|kind| kind.at(define_loc))
    }

    fn handle_undef(&mut self, cur: &mut Cursor) -> Result<(), AsmError> {
        cur.advance(1);
        let name_tok = Self::expect_ident(cur, "a macro name")?;
        let name = name_tok.lexeme.clone();
        let loc = name_tok.loc.clone();
        cur.skip_to_eol();

        if !self.macros.undefine(&name) {
            // Removing a macro that does not exist is harmless; flag it
            // and move on.
            warn!(%name, %loc, "undefining a macro that is not defined");
        }
        Ok(())
    }

    /* Conditionals ********************************************************/

    fn conditionally_active(&self) -> bool {
        self.cond_stack
            .last()
            .map_or(true, |frame| frame.currently_active)
    }

    /// Active state of the frame enclosing the top one.
    fn parent_active(&self) -> bool {
        match self.cond_stack.len() {
            0 | 1 => true,
            n => self.cond_stack[n - 2].currently_active,
        }
    }

    fn evaluate_condition(
        &mut self,
        cur: &mut Cursor,
        directive: &'static str,
    ) -> Result<bool, AsmError> {
        let mut condition = Vec::new();
        let mut loc = SourceLoc::default();
        while !cur.at_end() {
            if cur.splice_line() {
                continue;
            }
            let tok = cur.bump().expect("not at end");
            if tok.kind == TokenKind::Newline {
                break;
            }
            if condition.is_empty() {
                loc = tok.loc.clone();
            }
            condition.push(tok.clone());
        }

        if condition.is_empty() {
            return Err(AsmErrorKind::UnexpectedToken {
                expected: "a condition expression",
                found: "end of line".into(),
            }
            .at(loc));
        }
        validate_no_braces(&condition, directive)?;

        Ok(eval::evaluate(&condition, &self.macros)?.truthy())
    }

    fn handle_if(&mut self, cur: &mut Cursor) -> Result<(), AsmError> {
        let opened_at = cur.bump().expect("directive token").loc.clone();
        let condition = self.evaluate_condition(cur, ".if")?;
        let active = self.conditionally_active() && condition;
        self.cond_stack.push(CondFrame {
            condition_met: active,
            currently_active: active,
            else_seen: false,
            opened_at,
        });
        Ok(())
    }

    fn handle_ifdef(
        &mut self,
        cur: &mut Cursor,
        negate: bool,
    ) -> Result<(), AsmError> {
        let opened_at = cur.bump().expect("directive token").loc.clone();
        let name = Self::expect_ident(cur, "a macro name")?.lexeme.clone();
        cur.skip_to_eol();

        let defined = self.macros.is_defined(&name);
        let condition = defined != negate;
        let active = self.conditionally_active() && condition;
        self.cond_stack.push(CondFrame {
            condition_met: active,
            currently_active: active,
            else_seen: false,
            opened_at,
        });
        Ok(())
    }

    fn handle_elif(&mut self, cur: &mut Cursor) -> Result<(), AsmError> {
        let loc = cur.current().expect("directive token").loc.clone();
        if self.cond_stack.is_empty() {
            return Err(AsmErrorKind::DanglingConditional(".elif").at(loc));
        }
        if self.cond_stack.last().expect("non-empty").else_seen {
            return Err(AsmErrorKind::ElseAfterElse(".elif").at(loc));
        }
        cur.advance(1);

        let condition = self.evaluate_condition(cur, ".elif")?;
        let parent = self.parent_active();
        let frame = self.cond_stack.last_mut().expect("non-empty");
        let active = parent && !frame.condition_met && condition;
        frame.currently_active = active;
        frame.condition_met |= active;
        Ok(())
    }

    fn handle_else(&mut self, cur: &mut Cursor) -> Result<(), AsmError> {
        let loc = cur.current().expect("directive token").loc.clone();
        if self.cond_stack.is_empty() {
            return Err(AsmErrorKind::DanglingConditional(".else").at(loc));
        }
        if self.cond_stack.last().expect("non-empty").else_seen {
            return Err(AsmErrorKind::ElseAfterElse(".else").at(loc));
        }
        cur.advance(1);
        cur.skip_to_eol();

        let parent = self.parent_active();
        let frame = self.cond_stack.last_mut().expect("non-empty");
        frame.else_seen = true;
        frame.currently_active = parent && !frame.condition_met;
        frame.condition_met = true;
        Ok(())
    }

    fn handle_endif(&mut self, cur: &mut Cursor) -> Result<(), AsmError> {
        let loc = cur.current().expect("directive token").loc.clone();
        if self.cond_stack.pop().is_none() {
            return Err(AsmErrorKind::DanglingConditional(".endif").at(loc));
        }
        cur.advance(1);
        cur.skip_to_eol();
        Ok(())
    }

    /// Fast-forward through an inactive branch, honoring nesting, until a
    /// branch directive at our own depth takes over.
    fn skip_conditional_block(
        &mut self,
        cur: &mut Cursor,
    ) -> Result<(), AsmError> {
        let mut depth = 1usize;
        while let Some(tok) = cur.current() {
            if let TokenKind::Directive(directive) = tok.kind {
                match directive {
                    PpDirective::If
                    | PpDirective::Ifdef
                    | PpDirective::Ifndef => {
                        depth += 1;
                        cur.advance(1);
                    }
                    PpDirective::Endif => {
                        depth -= 1;
                        if depth == 0 {
                            return self.handle_endif(cur);
                        }
                        cur.advance(1);
                    }
                    PpDirective::Elif if depth == 1 => {
                        return self.handle_elif(cur)
                    }
                    PpDirective::Else if depth == 1 => {
                        return self.handle_else(cur)
                    }
                    _ => cur.advance(1),
                }
            } else {
                cur.advance(1);
            }
        }

        let frame = self.cond_stack.last().expect("inside a conditional");
        Err(
            AsmErrorKind::UnclosedConditional(frame.opened_at.line)
                .at(frame.opened_at.clone()),
        )
    }

    /* Loops ***************************************************************/

    /// Collect the body of a loop up to (not including) its matching end
    /// directive, tracking nested loops of every kind.
    fn collect_loop_body<'a>(
        cur: &mut Cursor<'a>,
        opened_at: &SourceLoc,
    ) -> Result<Vec<Token>, AsmError> {
        let mut body: Vec<Token> = Vec::new();
        let mut depth = 1usize;
        while let Some(tok) = cur.current() {
            if let TokenKind::Directive(directive) = tok.kind {
                match directive {
                    PpDirective::Repeat
                    | PpDirective::For
                    | PpDirective::While => depth += 1,
                    PpDirective::EndRepeat
                    | PpDirective::EndFor
                    | PpDirective::EndWhile => {
                        depth -= 1;
                        if depth == 0 {
                            // Consume the end directive and its line.
                            cur.advance(1);
                            cur.skip_to_eol();
                            return Ok(body);
                        }
                    }
                    _ => {}
                }
            }
            body.push(tok.clone());
            cur.advance(1);
        }
        Err(AsmErrorKind::UnclosedConditional(opened_at.line)
            .at(opened_at.clone()))
    }

    /// Run one loop iteration over the collected body, restoring the
    /// conditional depth afterwards in case `.break`/`.continue` bailed out
    /// of a nested `.if`.
    fn run_iteration(&mut self, body: &[Token]) -> Result<(), AsmError> {
        let cond_depth = self.cond_stack.len();
        let result = self.process_tokens(body);
        self.cond_stack.truncate(cond_depth);
        result
    }

    /// Collect expression tokens up to a comma, then an optional loop
    /// variable name. Returns (expression, variable).
    fn split_loop_header(
        cur: &mut Cursor,
    ) -> Result<(Vec<Token>, Option<String>), AsmError> {
        let mut expr = Vec::new();
        let mut variable = None;
        while !cur.at_end() {
            if cur.splice_line() {
                continue;
            }
            let tok = cur.bump().expect("not at end");
            match tok.kind {
                TokenKind::Newline => break,
                TokenKind::Comma => {
                    let name =
                        Self::expect_ident(cur, "a loop variable name")?;
                    variable = Some(name.lexeme.clone());
                    cur.skip_to_eol();
                    break;
                }
                _ => expr.push(tok.clone()),
            }
        }
        Ok((expr, variable))
    }

    fn handle_repeat(&mut self, cur: &mut Cursor) -> Result<(), AsmError> {
        let loc = cur.bump().expect("directive token").loc.clone();
        let (count_tokens, variable) = Self::split_loop_header(cur)?;
        if count_tokens.is_empty() {
            return Err(AsmErrorKind::UnexpectedToken {
                expected: "a repeat count",
                found: "end of line".into(),
            }
            .at(loc));
        }
        validate_no_braces(&count_tokens, ".repeat")?;
        let count = eval::evaluate(&count_tokens, &self.macros)?
            .to_int()
            .map_err(|kind| kind.at(loc.clone()))?;

        let body = Self::collect_loop_body(cur, &loc)?;
        if count <= 0 {
            return Ok(());
        }

        self.loop_flags.push(LoopFlags::default());
        let mut result = Ok(());
        for i in 0..count {
            if let Some(name) = &variable {
                self.macros.define_loop_variable(name, i, loc.clone());
            }
            self.loop_flags.last_mut().expect("pushed").should_continue =
                false;
            result = self.run_iteration(&body);
            if result.is_err()
                || self.loop_flags.last().expect("pushed").should_break
            {
                break;
            }
        }
        self.loop_flags.pop();
        if let Some(name) = &variable {
            self.macros.undefine(name);
        }
        result
    }

    fn handle_for(&mut self, cur: &mut Cursor) -> Result<(), AsmError> {
        let loc = cur.bump().expect("directive token").loc.clone();
        let variable = Self::expect_ident(cur, "a loop variable name")?
            .lexeme
            .clone();
        Self::expect_comma(cur)?;

        let start_tokens = Self::collect_until_comma_or_eol(cur);
        Self::expect_comma(cur)?;
        let end_tokens = Self::collect_until_comma_or_eol(cur);

        // The step expression is optional.
        let step_tokens = if cur
            .current()
            .is_some_and(|t| t.kind == TokenKind::Comma)
        {
            cur.advance(1);
            Self::collect_until_comma_or_eol(cur)
        } else {
            Vec::new()
        };
        cur.skip_to_eol();

        for (tokens, what) in [
            (&start_tokens, "start"),
            (&end_tokens, "end"),
        ] {
            if tokens.is_empty() {
                return Err(AsmErrorKind::UnexpectedToken {
                    expected: "a loop bound expression",
                    found: format!("missing {what} value"),
                }
                .at(loc));
            }
        }
        validate_no_braces(&start_tokens, ".for")?;
        validate_no_braces(&end_tokens, ".for")?;
        validate_no_braces(&step_tokens, ".for")?;

        let start = eval::evaluate(&start_tokens, &self.macros)?
            .to_int()
            .map_err(|kind| kind.at(loc.clone()))?;
        let end = eval::evaluate(&end_tokens, &self.macros)?
            .to_int()
            .map_err(|kind| kind.at(loc.clone()))?;
        let step = if step_tokens.is_empty() {
            1
        } else {
            eval::evaluate(&step_tokens, &self.macros)?
                .to_int()
                .map_err(|kind| kind.at(loc.clone()))?
        };
        if step == 0 {
            return Err(AsmErrorKind::ZeroForStep.at(loc));
        }

        let body = Self::collect_loop_body(cur, &loc)?;

        self.loop_flags.push(LoopFlags::default());
        let mut result = Ok(());
        let mut i = start;
        // Inclusive start, exclusive end; a step pointing away from the
        // interval runs zero iterations.
        while (step > 0 && i < end) || (step < 0 && i > end) {
            self.macros.define_loop_variable(&variable, i, loc.clone());
            self.loop_flags.last_mut().expect("pushed").should_continue =
                false;
            result = self.run_iteration(&body);
            if result.is_err()
                || self.loop_flags.last().expect("pushed").should_break
            {
                break;
            }
            i += step;
        }
        self.loop_flags.pop();
        self.macros.undefine(&variable);
        result
    }

    fn handle_while(&mut self, cur: &mut Cursor) -> Result<(), AsmError> {
        let loc = cur.bump().expect("directive token").loc.clone();
        let (condition, variable) = Self::split_loop_header(cur)?;
        if condition.is_empty() {
            return Err(AsmErrorKind::UnexpectedToken {
                expected: "a condition expression",
                found: "end of line".into(),
            }
            .at(loc));
        }
        validate_no_braces(&condition, ".while")?;

        let body = Self::collect_loop_body(cur, &loc)?;

        self.loop_flags.push(LoopFlags::default());
        let mut result = Ok(());
        let mut iteration = 0usize;
        loop {
            if iteration >= MAX_WHILE_ITERATIONS {
                result = Err(AsmErrorKind::InfiniteLoop(MAX_WHILE_ITERATIONS)
                    .at(loc.clone()));
                break;
            }
            let keep_going = match eval::evaluate(&condition, &self.macros) {
                Ok(value) => value.truthy(),
                Err(err) => {
                    result = Err(err);
                    break;
                }
            };
            if !keep_going {
                break;
            }

            if let Some(name) = &variable {
                self.macros.define_loop_variable(
                    name,
                    iteration as i64,
                    loc.clone(),
                );
            }
            self.loop_flags.last_mut().expect("pushed").should_continue =
                false;
            result = self.run_iteration(&body);
            if result.is_err()
                || self.loop_flags.last().expect("pushed").should_break
            {
                break;
            }
            iteration += 1;
        }
        self.loop_flags.pop();
        if let Some(name) = &variable {
            self.macros.undefine(name);
        }
        result
    }

    fn handle_break_continue(
        &mut self,
        cur: &mut Cursor,
        is_break: bool,
    ) -> Result<(), AsmError> {
        let tok = cur.bump().expect("directive token");
        let loc = tok.loc.clone();
        cur.skip_to_eol();

        let name = if is_break { ".break" } else { ".continue" };
        let Some(flags) = self.loop_flags.last_mut() else {
            return Err(AsmErrorKind::BreakOutsideLoop(name).at(loc));
        };
        if is_break {
            flags.should_break = true;
        } else {
            flags.should_continue = true;
        }
        Ok(())
    }

    fn expect_comma(cur: &mut Cursor) -> Result<(), AsmError> {
        match cur.bump() {
            Some(tok) if tok.kind == TokenKind::Comma => Ok(()),
            Some(tok) => Err(AsmErrorKind::UnexpectedToken {
                expected: "','",
                found: format!("'{}'", tok.lexeme),
            }
            .at(tok.loc.clone())),
            None => Err(AsmErrorKind::UnexpectedToken {
                expected: "','",
                found: "end of input".into(),
            }
            .at(SourceLoc::default())),
        }
    }

    fn collect_until_comma_or_eol(cur: &mut Cursor) -> Vec<Token> {
        let mut out = Vec::new();
        while let Some(tok) = cur.current() {
            if cur.splice_line() {
                continue;
            }
            match tok.kind {
                TokenKind::Comma | TokenKind::Newline => break,
                _ => {
                    out.push(tok.clone());
                    cur.advance(1);
                }
            }
        }
        out
    }

    /* Interpolation and braced expressions ********************************/

    /// `ident{expr}`, `{expr}ident`, and longer chains concatenate into a
    /// single bare identifier when the pieces are adjacent.
    fn handle_identifier_interpolation(
        &mut self,
        cur: &mut Cursor,
    ) -> Result<bool, AsmError> {
        let Some(tok) = cur.current() else {
            return Ok(false);
        };

        match tok.kind {
            TokenKind::Ident => {
                // Only an identifier immediately touching a `{` starts an
                // interpolation.
                let Some(next) = cur.peek(1) else { return Ok(false) };
                if next.kind != TokenKind::LBrace
                    || !tok.is_adjacent_to(next)
                {
                    return Ok(false);
                }
            }
            TokenKind::LBrace => {
                // A braced group is only the head of an identifier
                // interpolation when an identifier touches its `}`.
                let mut depth = 1usize;
                let mut scan = cur.pos + 1;
                while scan < cur.tokens.len() && depth > 0 {
                    match cur.tokens[scan].kind {
                        TokenKind::LBrace => depth += 1,
                        TokenKind::RBrace => depth -= 1,
                        _ => {}
                    }
                    scan += 1;
                }
                if depth > 0 || scan >= cur.tokens.len() {
                    return Ok(false);
                }
                let closing = &cur.tokens[scan - 1];
                let after = &cur.tokens[scan];
                if after.kind != TokenKind::Ident
                    || !closing.is_adjacent_to(after)
                {
                    return Ok(false);
                }
            }
            _ => return Ok(false),
        }

        // Build the concatenated identifier.
        let mut result = String::new();
        loop {
            let Some(tok) = cur.current() else { break };
            match tok.kind {
                TokenKind::Ident => {
                    result.push_str(&tok.lexeme);
                    let prev = cur.bump().expect("not at end");
                    let Some(next) = cur.current() else { break };
                    if next.kind == TokenKind::LBrace
                        && prev.is_adjacent_to(next)
                    {
                        continue;
                    }
                    break;
                }
                TokenKind::LBrace => {
                    let (group, _loc) =
                        collect_braced(cur, "identifier interpolation")?;
                    let value = eval::evaluate(&group, &self.macros)?;
                    result.push_str(&value.render(false));

                    let Some(after) = cur.current() else { break };
                    let closing = &cur.tokens[cur.pos - 1];
                    if (after.kind == TokenKind::Ident
                        || after.kind == TokenKind::LBrace)
                        && closing.is_adjacent_to(after)
                    {
                        continue;
                    }
                    break;
                }
                _ => break,
            }
        }

        self.append_text(&result);
        Ok(true)
    }

    /// `"text {expr} text"`: each balanced group inside a string literal is
    /// evaluated and replaced; the quotes stay.
    fn handle_string_interpolation(
        &mut self,
        cur: &mut Cursor,
    ) -> Result<bool, AsmError> {
        let Some(tok) = cur.current() else {
            return Ok(false);
        };
        if tok.kind != TokenKind::Str || !tok.lexeme.contains('{') {
            return Ok(false);
        }
        let loc = tok.loc.clone();
        let content = tok.lexeme.clone();
        cur.advance(1);

        let mut result = String::new();
        let mut rest = content.as_str();
        while let Some(open) = rest.find('{') {
            result.push_str(&rest[..open]);
            let after_open = &rest[open + 1..];

            let mut depth = 1usize;
            let mut end = None;
            for (i, c) in after_open.char_indices() {
                match c {
                    '{' => depth += 1,
                    '}' => {
                        depth -= 1;
                        if depth == 0 {
                            end = Some(i);
                            break;
                        }
                    }
                    _ => {}
                }
            }
            let Some(end) = end else {
                return Err(AsmErrorKind::UnmatchedBrace("string literal")
                    .at(loc));
            };

            let expr_text = &after_open[..end];
            let expr_tokens: Vec<Token> =
                token::scan(expr_text, loc.file.as_ref())?
                    .into_iter()
                    .filter(|t| t.kind != TokenKind::Newline)
                    .collect();
            if expr_tokens.is_empty() {
                return Err(AsmErrorKind::EmptyBracedExpression.at(loc));
            }
            let value = eval::evaluate(&expr_tokens, &self.macros)?;
            result.push_str(&value.render(false));

            rest = &after_open[end + 1..];
        }
        result.push_str(rest);

        if self.needs_space {
            self.out.push(' ');
        }
        self.out.push('"');
        self.out.push_str(&result);
        self.out.push('"');
        self.needs_space = true;
        Ok(true)
    }

    /// A top-level `{expr}` evaluates and splices its textual rendering.
    /// String results keep their quotes unless the group is immediately
    /// followed by `:`, which supports using an evaluated name as a label
    /// or directive argument.
    fn handle_braced_expression(
        &mut self,
        cur: &mut Cursor,
    ) -> Result<bool, AsmError> {
        let Some(tok) = cur.current() else {
            return Ok(false);
        };
        if tok.kind != TokenKind::LBrace {
            return Ok(false);
        }

        let (group, _loc) = collect_braced(cur, "expression")?;
        let quote_strings = cur
            .current()
            .map_or(true, |next| next.kind != TokenKind::Colon);

        let value = eval::evaluate(&group, &self.macros)?;
        let rendered = value.render(quote_strings);
        self.append_text(&rendered);
        Ok(true)
    }

    fn try_expand_macro(&mut self, cur: &mut Cursor) -> bool {
        let Some(tok) = cur.current() else {
            return false;
        };
        if tok.kind != TokenKind::Ident {
            return false;
        }
        let Some(macro_) = self.macros.lookup(&tok.lexeme) else {
            return false;
        };
        let replacement = macro_.replacement.clone();
        cur.advance(1);
        for tok in &replacement {
            self.append_token(tok);
        }
        true
    }
}

/// Collect a balanced braced group starting at `{`; newlines inside are
/// dropped, the delimiters are not part of the result.
fn collect_braced(
    cur: &mut Cursor,
    context: &'static str,
) -> Result<(Vec<Token>, SourceLoc), AsmError> {
    let open_loc = cur.bump().expect("on a left brace").loc.clone();
    let mut group = Vec::new();
    let mut depth = 1usize;

    while depth > 0 {
        if cur.splice_line() {
            continue;
        }
        let Some(tok) = cur.bump() else {
            return Err(AsmErrorKind::UnmatchedBrace(context).at(open_loc));
        };
        match tok.kind {
            TokenKind::LBrace => {
                depth += 1;
                group.push(tok.clone());
            }
            TokenKind::RBrace => {
                depth -= 1;
                if depth > 0 {
                    group.push(tok.clone());
                }
            }
            TokenKind::Newline => {}
            _ => group.push(tok.clone()),
        }
    }

    if group.is_empty() {
        return Err(AsmErrorKind::EmptyBracedExpression.at(open_loc));
    }
    Ok((group, open_loc))
}

fn validate_no_braces(
    tokens: &[Token],
    directive: &'static str,
) -> Result<(), AsmError> {
    for tok in tokens {
        if matches!(tok.kind, TokenKind::LBrace | TokenKind::RBrace) {
            return Err(AsmErrorKind::BracesNotAllowedHere(directive)
                .at(tok.loc.clone()));
        }
    }
    Ok(())
}

fn token_from_value(value: &Value, loc: SourceLoc) -> Token {
    match value {
        Value::Int(v) => Token::synthetic_int(*v, loc),
        Value::Fixed(v) => Token {
            kind: TokenKind::Number((*v as i64) as f64 / 4_294_967_296.0),
            lexeme: value.render(false),
            loc,
        },
        Value::Str(s) => Token {
            kind: TokenKind::Str,
            lexeme: s.clone(),
            loc,
        },
    }
}
