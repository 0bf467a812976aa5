use tantivy::schema::{Field, IndexRecordOption, Schema, TextFieldIndexing, TextOptions, STORED, STRING};
use tantivy::tokenizer::{LowerCaser, SimpleTokenizer, StopWordFilter, TextAnalyzer};
use tantivy::Index;

pub const TOKENIZER: &str = "movie_text";

/// Handles to the fields of the movies schema.
#[derive(Debug, Clone, Copy)]
pub struct MovieFields {
	/// JSON-encoded id: the upsert term, and stored so integer and string ids
	/// survive the round trip. `42` and `"42"` stay distinct.
	pub id_json: Field,
	pub title: Field,
	pub original_title: Field,
	pub overview: Field,
}

impl MovieFields {
	pub fn resolve(schema: &Schema) -> tantivy::Result<Self> {
		Ok(Self {
			id_json: schema.get_field("id_json")?,
			title: schema.get_field("title")?,
			original_title: schema.get_field("original_title")?,
			overview: schema.get_field("overview")?,
		})
	}

	pub fn searchable(&self) -> Vec<Field> { vec![self.title, self.original_title, self.overview] }
}

pub fn build_schema() -> Schema {
	let mut schema_builder = Schema::builder();
	schema_builder.add_text_field("id_json", STRING | STORED);
	let text_field_indexing = TextFieldIndexing::default().set_tokenizer(TOKENIZER).set_index_option(IndexRecordOption::WithFreqsAndPositions);
	let text_options = TextOptions::default().set_indexing_options(text_field_indexing);
	schema_builder.add_text_field("title", text_options.clone());
	schema_builder.add_text_field("original_title", text_options.clone());
	schema_builder.add_text_field("overview", text_options);
	schema_builder.build()
}

pub fn register_tokenizer(index: &Index) {
	let stop_words = [
		"a","an","and","are","as","at","be","by","for","from","has","in","is","it","its","of","on","that","the","to","was","will","with","or","but",
	];
	let tokenizer = TextAnalyzer::builder(SimpleTokenizer::default())
		.filter(LowerCaser)
		.filter(StopWordFilter::remove(stop_words.into_iter().map(|s| s.to_string())))
		.build();
	index.tokenizers().register(TOKENIZER, tokenizer);
}
