use crate::complexity::complexity_score;
use crate::error::{ChunkerError, Result};
use crate::language::Language;
use crate::types::{ChunkType, CodeChunk};
use semsync_protocol::ChunkingConfig;
use tree_sitter::{Node, Parser};

/// Tree-sitter backed extraction of function- and class-shaped chunks.
///
/// The analyzer owns its parser; a fresh instance is cheap and keeps the
/// chunker itself `Send`-friendly.
pub struct AstAnalyzer {
    parser: Parser,
    language: Language,
}

impl AstAnalyzer {
    pub fn new(language: Language) -> Result<Self> {
        let mut parser = Parser::new();
        parser
            .set_language(&language.tree_sitter_language()?)
            .map_err(|e| ChunkerError::TreeSitter(e.to_string()))?;
        Ok(Self { parser, language })
    }

    /// Chunk a file along its declaration boundaries.
    ///
    /// Fails with a parse error when the grammar reports syntax errors so
    /// the caller can fall through to the next strategy. A file that parses
    /// but contains no declarations yields one whole-file generic chunk.
    pub fn chunk(
        &mut self,
        content: &str,
        rel_path: &str,
        config: &ChunkingConfig,
    ) -> Result<Vec<CodeChunk>> {
        let tree = self
            .parser
            .parse(content, None)
            .ok_or_else(|| ChunkerError::parse(format!("no parse tree for {rel_path}")))?;
        let root = tree.root_node();
        if root.has_error() {
            return Err(ChunkerError::parse(format!(
                "syntax errors in {rel_path}, falling back"
            )));
        }

        let language_name = Some(self.language.as_str().to_string());
        let mut chunks = Vec::new();
        let mut import_span: Option<(usize, usize)> = None;

        let mut cursor = root.walk();
        for node in root.children(&mut cursor) {
            let Some(chunk_type) = self.declaration_kind(node.kind()) else {
                continue;
            };

            if chunk_type == ChunkType::Import {
                // Consecutive import statements collapse into one chunk.
                let (start, end) = node_lines(&node);
                import_span = Some(match import_span {
                    Some((first, last)) if start <= last + 1 => (first, end),
                    Some(span) => {
                        chunks.push(self.span_chunk(content, rel_path, span, ChunkType::Import));
                        (start, end)
                    }
                    None => (start, end),
                });
                continue;
            }

            if chunk_type == ChunkType::Class || chunk_type == ChunkType::Interface {
                self.emit_class(content, rel_path, &node, chunk_type, config, &mut chunks);
            } else {
                let mut chunk = self.node_chunk(content, rel_path, &node, chunk_type);
                chunk.function_name = self.node_name(content, &node);
                chunks.push(chunk);
            }
        }
        if let Some(span) = import_span {
            chunks.push(self.span_chunk(content, rel_path, span, ChunkType::Import));
        }

        if chunks.is_empty() {
            let total_lines = content.lines().count().max(1);
            let mut chunk = CodeChunk::new(
                rel_path,
                1,
                total_lines,
                content,
                language_name,
                ChunkType::Generic,
            );
            chunk.complexity = Some(complexity_score(content));
            return Ok(vec![chunk]);
        }

        chunks.sort_by_key(|c| c.start_line);
        Ok(chunks)
    }

    /// Emit a class-like node. Small classes become one chunk; classes whose
    /// span exceeds the max chunk size are split into a header chunk plus one
    /// method chunk per member, keeping line ranges disjoint.
    fn emit_class(
        &self,
        content: &str,
        rel_path: &str,
        node: &Node<'_>,
        chunk_type: ChunkType,
        config: &ChunkingConfig,
        out: &mut Vec<CodeChunk>,
    ) {
        let class_name = self.node_name(content, node);
        let span_len = node.end_byte().saturating_sub(node.start_byte());

        let methods = self.collect_methods(node);
        if span_len <= config.max_chunk_size || methods.is_empty() {
            let mut chunk = self.node_chunk(content, rel_path, node, chunk_type);
            chunk.class_name = class_name;
            out.push(chunk);
            return;
        }

        let (class_start, _) = node_lines(node);
        let first_method_line = methods
            .iter()
            .map(|m| node_lines(m).0)
            .min()
            .unwrap_or(class_start);
        if first_method_line > class_start {
            let mut header = self.span_chunk(
                content,
                rel_path,
                (class_start, first_method_line - 1),
                chunk_type,
            );
            header.class_name = class_name.clone();
            out.push(header);
        }
        for method in methods {
            let mut chunk = self.node_chunk(content, rel_path, &method, ChunkType::Method);
            chunk.function_name = self.node_name(content, &method);
            chunk.class_name = class_name.clone();
            out.push(chunk);
        }
    }

    fn collect_methods<'tree>(&self, class_node: &Node<'tree>) -> Vec<Node<'tree>> {
        let Some(body) = class_node.child_by_field_name("body") else {
            return Vec::new();
        };
        let mut cursor = body.walk();
        let methods: Vec<Node<'tree>> = body
            .children(&mut cursor)
            .filter(|child| self.is_method_kind(child.kind()))
            .collect();
        methods
    }

    fn is_method_kind(&self, kind: &str) -> bool {
        match self.language {
            Language::Rust => kind == "function_item",
            Language::Python => kind == "function_definition",
            Language::JavaScript | Language::TypeScript => kind == "method_definition",
            _ => false,
        }
    }

    fn declaration_kind(&self, kind: &str) -> Option<ChunkType> {
        match self.language {
            Language::Rust => match kind {
                "function_item" => Some(ChunkType::Function),
                "struct_item" | "enum_item" | "union_item" | "impl_item" => Some(ChunkType::Class),
                "trait_item" => Some(ChunkType::Interface),
                "use_declaration" => Some(ChunkType::Import),
                _ => None,
            },
            Language::Python => match kind {
                "function_definition" | "decorated_definition" => Some(ChunkType::Function),
                "class_definition" => Some(ChunkType::Class),
                "import_statement" | "import_from_statement" => Some(ChunkType::Import),
                _ => None,
            },
            Language::JavaScript | Language::TypeScript => match kind {
                "function_declaration" | "generator_function_declaration" => {
                    Some(ChunkType::Function)
                }
                "class_declaration" => Some(ChunkType::Class),
                "interface_declaration" => Some(ChunkType::Interface),
                "import_statement" => Some(ChunkType::Import),
                _ => None,
            },
            _ => None,
        }
    }

    fn node_name(&self, content: &str, node: &Node<'_>) -> Option<String> {
        let name_node = node
            .child_by_field_name("name")
            .or_else(|| node.child_by_field_name("type"))?;
        content
            .get(name_node.start_byte()..name_node.end_byte())
            .map(str::to_string)
    }

    fn node_chunk(
        &self,
        content: &str,
        rel_path: &str,
        node: &Node<'_>,
        chunk_type: ChunkType,
    ) -> CodeChunk {
        let (start_line, end_line) = node_lines(node);
        let text = content
            .get(node.start_byte()..node.end_byte())
            .unwrap_or_default();
        let mut chunk = CodeChunk::new(
            rel_path,
            start_line,
            end_line,
            text,
            Some(self.language.as_str().to_string()),
            chunk_type,
        );
        chunk.complexity = Some(complexity_score(text));
        chunk
    }

    fn span_chunk(
        &self,
        content: &str,
        rel_path: &str,
        (start_line, end_line): (usize, usize),
        chunk_type: ChunkType,
    ) -> CodeChunk {
        let text: String = content
            .lines()
            .skip(start_line.saturating_sub(1))
            .take(end_line.saturating_sub(start_line) + 1)
            .collect::<Vec<_>>()
            .join("\n");
        let mut chunk = CodeChunk::new(
            rel_path,
            start_line,
            end_line,
            text.as_str(),
            Some(self.language.as_str().to_string()),
            chunk_type,
        );
        chunk.complexity = Some(complexity_score(&text));
        chunk
    }
}

/// Node span as 1-indexed inclusive lines.
fn node_lines(node: &Node<'_>) -> (usize, usize) {
    (
        node.start_position().row + 1,
        node.end_position().row + 1,
    )
}
