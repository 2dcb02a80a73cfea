//! Script-block metadata: tick range, trigger kind, filters, and the
//! identifier-use summary the scheduler consults to decide which symbols
//! to bind before handing a block to the interpreter.

use crate::ast::AstNode;
use crate::error::{ScriptErrorKind, ScriptResult};
use crate::functions::WILDCARD_FUNCTIONS;
use crate::symbols::BUILTIN_CONSTANTS;
use crate::token::TokenKind;
use crate::value::Value;

pub type Tick = i64;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BlockKind {
    Event,
    FitnessCallback,
    MateChoiceCallback,
    ModifyChildCallback,
}

/// Callback parameter names the kernel may bind before evaluating a block.
pub const CALLBACK_PARAMETERS: [&str; 15] = [
    "mut",
    "relFitness",
    "homozygous",
    "genome1",
    "genome2",
    "subpop",
    "sourceSubpop",
    "weights",
    "childGenome1",
    "childGenome2",
    "childIsFemale",
    "parent1Genome1",
    "parent1Genome2",
    "parent2Genome1",
    "parent2Genome2",
];

/// Which identifiers a block's body references. A wildcard identifier (a
/// meta-function that could reach any symbol) forces every flag on.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct UseSummary {
    pub constants: [bool; BUILTIN_CONSTANTS.len()],
    /// `p<N>` subpopulation instance identifiers.
    pub subpop_instances: bool,
    /// `g<N>` genomic-element instance identifiers.
    pub genomic_element_instances: bool,
    /// `m<N>` mutation-type instance identifiers.
    pub mutation_type_instances: bool,
    /// `s<N>` script-block instance identifiers.
    pub script_block_instances: bool,
    pub callback_parameters: [bool; CALLBACK_PARAMETERS.len()],
    pub wildcard: bool,
}

impl UseSummary {
    fn record(&mut self, name: &str) {
        if WILDCARD_FUNCTIONS.contains(&name) {
            self.set_all();
            return;
        }
        if let Some(idx) = BUILTIN_CONSTANTS.iter().position(|&c| c == name) {
            self.constants[idx] = true;
        }
        if let Some(idx) = CALLBACK_PARAMETERS.iter().position(|&p| p == name) {
            self.callback_parameters[idx] = true;
        }
        if let Some(prefix) = name.chars().next() {
            let digits = &name[1..];
            if !digits.is_empty() && digits.bytes().all(|b| b.is_ascii_digit()) {
                match prefix {
                    'p' => self.subpop_instances = true,
                    'g' => self.genomic_element_instances = true,
                    'm' => self.mutation_type_instances = true,
                    's' => self.script_block_instances = true,
                    _ => {}
                }
            }
        }
    }

    fn set_all(&mut self) {
        self.constants = [true; BUILTIN_CONSTANTS.len()];
        self.subpop_instances = true;
        self.genomic_element_instances = true;
        self.mutation_type_instances = true;
        self.script_block_instances = true;
        self.callback_parameters = [true; CALLBACK_PARAMETERS.len()];
        self.wildcard = true;
    }

    pub fn uses_constant(&self, name: &str) -> bool {
        BUILTIN_CONSTANTS
            .iter()
            .position(|&c| c == name)
            .map(|idx| self.constants[idx])
            .unwrap_or(false)
    }

    pub fn uses_parameter(&self, name: &str) -> bool {
        CALLBACK_PARAMETERS
            .iter()
            .position(|&p| p == name)
            .map(|idx| self.callback_parameters[idx])
            .unwrap_or(false)
    }
}

/// One script block from a simulation file: trigger metadata plus the
/// owned AST subtree whose last child is the compound-statement body.
#[derive(Debug)]
pub struct ScriptBlock {
    pub id: Option<i64>,
    pub kind: BlockKind,
    pub start_tick: Tick,
    pub end_tick: Tick,
    pub mutation_type_filter: Option<i64>,
    pub subpop_filter: Option<i64>,
    pub active: bool,
    pub uses: UseSummary,
    root: AstNode,
    body_index: usize,
}

impl ScriptBlock {
    /// Take ownership of a `SimBlock` subtree and extract its metadata.
    /// The identifier-use summary is produced here, once, by a DFS over
    /// the body.
    pub fn from_ast(root: AstNode) -> ScriptResult<Self> {
        debug_assert_eq!(root.kind(), TokenKind::SimBlock);

        let mut id = None;
        let mut start_tick = None;
        let mut end_tick = None;
        let mut kind = BlockKind::Event;
        let mut mutation_type_filter = None;
        let mut subpop_filter = None;
        let mut body_index = None;

        for (index, child) in root.children.iter().enumerate() {
            match child.kind() {
                TokenKind::Str => {
                    id = Some(parse_block_id(child)?);
                }
                TokenKind::Number => {
                    let tick = literal_integer(child);
                    if start_tick.is_none() {
                        start_tick = Some(tick);
                    } else {
                        end_tick = Some(tick);
                    }
                }
                TokenKind::Fitness => {
                    kind = BlockKind::FitnessCallback;
                    mutation_type_filter = child.children.first().map(literal_integer);
                    subpop_filter = child.children.get(1).map(literal_integer);
                }
                TokenKind::MateChoice => {
                    kind = BlockKind::MateChoiceCallback;
                    subpop_filter = child.children.first().map(literal_integer);
                }
                TokenKind::ModifyChild => {
                    kind = BlockKind::ModifyChildCallback;
                    subpop_filter = child.children.first().map(literal_integer);
                }
                TokenKind::LBrace => {
                    body_index = Some(index);
                }
                other => {
                    return Err(ScriptErrorKind::UnexpectedToken {
                        found: other,
                        context: "script block",
                    }
                    .at(child.token.span))
                }
            }
        }

        let body_index = body_index.ok_or_else(|| {
            ScriptErrorKind::ExpectedToken {
                expected: TokenKind::LBrace,
                found: TokenKind::Eof,
                context: "script block",
            }
            .at(root.token.span)
        })?;

        // no range means every tick; a single start means exactly that tick
        let start = start_tick.unwrap_or(1);
        let end = match (start_tick, end_tick) {
            (Some(start), None) => start,
            (_, Some(end)) => end,
            (None, None) => Tick::MAX,
        };

        let mut uses = UseSummary::default();
        scan_identifiers(&root.children[body_index], &mut uses);

        Ok(Self {
            id,
            kind,
            start_tick: start,
            end_tick: end,
            mutation_type_filter,
            subpop_filter,
            active: true,
            uses,
            root,
            body_index,
        })
    }

    /// Split a parsed simulation file into its blocks, consuming the file
    /// node.
    pub fn blocks_from_sim_file(file_root: AstNode) -> ScriptResult<Vec<ScriptBlock>> {
        debug_assert_eq!(file_root.kind(), TokenKind::SimFile);
        file_root.children.into_iter().map(ScriptBlock::from_ast).collect()
    }

    pub fn root(&self) -> &AstNode {
        &self.root
    }

    /// The compound-statement body to hand to the interpreter.
    pub fn body(&self) -> &AstNode {
        &self.root.children[self.body_index]
    }

    pub fn matches_tick(&self, tick: Tick) -> bool {
        self.active && self.start_tick <= tick && tick <= self.end_tick
    }

    pub fn is_callback(&self) -> bool {
        self.kind != BlockKind::Event
    }
}

fn literal_integer(node: &AstNode) -> i64 {
    match &node.constant {
        Some(value) => value.integer_at(0).unwrap_or(0),
        None => node.token.lexeme.parse().unwrap_or(0),
    }
}

/// Block ids are string literals of the form `"s<number>"`.
fn parse_block_id(node: &AstNode) -> ScriptResult<i64> {
    let text = match &node.constant {
        Some(Value::Str(v)) if v.len() == 1 => v[0].clone(),
        _ => node.token.lexeme.clone(),
    };
    let digits = text.strip_prefix('s').unwrap_or("");
    if digits.is_empty() || !digits.bytes().all(|b| b.is_ascii_digit()) {
        return Err(ScriptErrorKind::MalformedBlockId(text).at(node.token.span));
    }
    digits
        .parse()
        .map_err(|_| ScriptErrorKind::MalformedBlockId(text).at(node.token.span))
}

fn scan_identifiers(node: &AstNode, uses: &mut UseSummary) {
    if node.kind() == TokenKind::Identifier {
        uses.record(&node.token.lexeme);
    }
    for child in &node.children {
        scan_identifiers(child, uses);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::lexer::Lexer;
    use crate::parser::Parser;

    fn blocks(source: &str) -> Vec<ScriptBlock> {
        let tokens = Lexer::new(source).tokenize().unwrap();
        let file = Parser::new(&tokens).parse_sim_file().unwrap();
        ScriptBlock::blocks_from_sim_file(file).unwrap()
    }

    #[test]
    fn preamble_variants_produce_the_documented_ranges() {
        let parsed = blocks(
            r#"
            "s1" 10 { 1; }
            100:200 { 2; }
            { 3; }
            "#,
        );
        assert_eq!(parsed[0].id, Some(1));
        assert_eq!((parsed[0].start_tick, parsed[0].end_tick), (10, 10));
        assert_eq!(parsed[1].id, None);
        assert_eq!((parsed[1].start_tick, parsed[1].end_tick), (100, 200));
        assert_eq!((parsed[2].start_tick, parsed[2].end_tick), (1, Tick::MAX));
        assert!(parsed.iter().all(|b| b.kind == BlockKind::Event));
    }

    #[test]
    fn callback_headers_set_kind_and_filters() {
        let parsed = blocks(
            r#"
            1:10 fitness(2, 3) { relFitness; }
            mateChoice(1) { weights; }
            modifyChild() { childGenome1; }
            "#,
        );
        assert_eq!(parsed[0].kind, BlockKind::FitnessCallback);
        assert_eq!(parsed[0].mutation_type_filter, Some(2));
        assert_eq!(parsed[0].subpop_filter, Some(3));
        assert!(parsed[0].is_callback());

        assert_eq!(parsed[1].kind, BlockKind::MateChoiceCallback);
        assert_eq!(parsed[1].subpop_filter, Some(1));
        assert_eq!(parsed[1].mutation_type_filter, None);

        assert_eq!(parsed[2].kind, BlockKind::ModifyChildCallback);
        assert_eq!(parsed[2].subpop_filter, None);
    }

    #[test]
    fn malformed_block_ids_are_fatal() {
        let tokens = Lexer::new("\"x9\" 1 { 1; }").tokenize().unwrap();
        let file = Parser::new(&tokens).parse_sim_file().unwrap();
        let err = ScriptBlock::blocks_from_sim_file(file).unwrap_err();
        assert!(matches!(err.kind, ScriptErrorKind::MalformedBlockId(_)));
    }

    #[test]
    fn tick_matching_respects_range_and_active_flag() {
        let mut parsed = blocks("5:7 { 1; }");
        let block = &mut parsed[0];
        assert!(!block.matches_tick(4));
        assert!(block.matches_tick(5));
        assert!(block.matches_tick(7));
        assert!(!block.matches_tick(8));
        block.active = false;
        assert!(!block.matches_tick(6));
    }

    #[test]
    fn use_summary_records_constants_instances_and_parameters() {
        let parsed = blocks("{ x = T; y = p2; z = m10; mut; relFitness; }");
        let uses = &parsed[0].uses;
        assert!(uses.uses_constant("T"));
        assert!(!uses.uses_constant("F"));
        assert!(uses.subpop_instances);
        assert!(uses.mutation_type_instances);
        assert!(!uses.genomic_element_instances);
        assert!(!uses.script_block_instances);
        assert!(uses.uses_parameter("mut"));
        assert!(uses.uses_parameter("relFitness"));
        assert!(!uses.uses_parameter("subpop"));
        assert!(!uses.wildcard);
    }

    #[test]
    fn instance_patterns_require_digits() {
        let parsed = blocks("{ price = 1; p = 2; p2x = 3; }");
        let uses = &parsed[0].uses;
        assert!(!uses.subpop_instances);
    }

    #[test]
    fn wildcard_identifiers_force_every_flag() {
        let parsed = blocks("{ rm(\"x\"); }");
        let uses = &parsed[0].uses;
        assert!(uses.wildcard);
        assert!(uses.uses_constant("NAN"));
        assert!(uses.subpop_instances);
        assert!(uses.uses_parameter("childIsFemale"));
    }

    #[test]
    fn summary_is_limited_to_the_body() {
        // the preamble's callback header mentions nothing scannable; only
        // body identifiers are recorded
        let parsed = blocks("1:2 fitness(1) { homozygous; }");
        let uses = &parsed[0].uses;
        assert!(uses.uses_parameter("homozygous"));
        assert!(!uses.uses_parameter("mut"));
    }
}
