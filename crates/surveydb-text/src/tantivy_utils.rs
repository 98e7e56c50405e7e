//! Text analysis pipeline shared by indexing and querying.
//!
//! Tokens are runs of letters/digits, optionally joined by `-` or `_`, so
//! programme codes such as `FTF-ZOI`, `end-line` or `p2` survive intact. Each
//! joined code is followed by its parts, so `ZOI` still reaches `FTF-ZOI`.
use tantivy::tokenizer::{
	LowerCaser, RegexTokenizer, StopWordFilter, TextAnalyzer, Token, TokenFilter, TokenStream, Tokenizer,
};

use surveydb_core::error::{Error, Result};

const TOKEN_PATTERN: &str = r"[\p{L}\p{N}]+(?:[-_][\p{L}\p{N}]+)*";

const JOINERS: [char; 2] = ['-', '_'];

const STOP_WORDS: &[&str] = &[
	"a","an","and","are","as","at","be","by","for","from","has","he","in","is","it","its","of","on","that","the","to","was","will","with","or","but","not","this","these","they","them","their","there","then","than","so","if","when","where","why","how","what","which","who","whom","whose","can","could","should","would","may","might","must","shall","do","does","did","have","had","having",
];

pub fn build_analyzer() -> Result<TextAnalyzer> {
	let tokenizer = RegexTokenizer::new(TOKEN_PATTERN).map_err(|e| Error::Operation(format!("tokenizer pattern: {e}")))?;
	Ok(TextAnalyzer::builder(tokenizer)
		.filter(LowerCaser)
		.filter(CompoundParts)
		.filter(StopWordFilter::remove(STOP_WORDS.iter().map(|s| s.to_string())))
		.build())
}

/// Run `text` through the analyzer and collect the surviving terms in order.
pub fn tokenize(analyzer: &mut TextAnalyzer, text: &str) -> Vec<String> {
	let mut terms = Vec::new();
	let mut stream = analyzer.token_stream(text);
	while stream.advance() {
		terms.push(stream.token().text.clone());
	}
	terms
}

/// Emits every joined token unchanged, then each of its parts at the same position.
#[derive(Clone, Copy, Debug)]
pub struct CompoundParts;

impl TokenFilter for CompoundParts {
	type Tokenizer<T: Tokenizer> = CompoundPartsFilter<T>;

	fn transform<T: Tokenizer>(self, tokenizer: T) -> CompoundPartsFilter<T> {
		CompoundPartsFilter { inner: tokenizer, pending: Vec::new() }
	}
}

#[derive(Clone)]
pub struct CompoundPartsFilter<T> {
	inner: T,
	pending: Vec<Token>,
}

impl<T: Tokenizer> Tokenizer for CompoundPartsFilter<T> {
	type TokenStream<'a> = CompoundPartsStream<'a, T::TokenStream<'a>>;

	fn token_stream<'a>(&'a mut self, text: &'a str) -> Self::TokenStream<'a> {
		self.pending.clear();
		CompoundPartsStream { tail: self.inner.token_stream(text), pending: &mut self.pending }
	}
}

/// `pending` is a stack: the top is the current token.
pub struct CompoundPartsStream<'a, T> {
	tail: T,
	pending: &'a mut Vec<Token>,
}

impl<T: TokenStream> CompoundPartsStream<'_, T> {
	fn queue(&mut self) {
		let token = self.tail.token();
		if !token.text.contains(JOINERS) {
			return;
		}
		let mut parts = Vec::new();
		let mut offset = token.offset_from;
		for piece in token.text.split(JOINERS) {
			if !piece.is_empty() {
				let mut part = token.clone();
				part.text = piece.to_string();
				part.offset_from = offset;
				part.offset_to = offset + piece.len();
				parts.push(part);
			}
			offset += piece.len() + 1;
		}
		self.pending.extend(parts.into_iter().rev());
		self.pending.push(token.clone());
	}
}

impl<T: TokenStream> TokenStream for CompoundPartsStream<'_, T> {
	fn advance(&mut self) -> bool {
		if self.pending.pop().is_some() && !self.pending.is_empty() {
			return true;
		}
		if !self.tail.advance() {
			return false;
		}
		self.queue();
		true
	}

	fn token(&self) -> &Token {
		self.pending.last().unwrap_or_else(|| self.tail.token())
	}

	fn token_mut(&mut self) -> &mut Token {
		match self.pending.last_mut() {
			Some(token) => token,
			None => self.tail.token_mut(),
		}
	}
}
