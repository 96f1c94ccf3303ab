//! Demo: map a book catalogue onto typed records.
//!
//! Reads the catalogue from the file given as first argument, or from a
//! built-in sample, and prints one summary line per book plus totals.
//!
//! Run with: cargo run --example demo_catalog [catalog.xml]

use std::env;

use chrono::NaiveDate;
use xmlmap_rs::{CallbackError, Engine};

const SAMPLE: &str = r#"<?xml version="1.0" encoding="UTF-8"?>
<catalog xmlns:c="urn:example:catalog">
  <book id="bk101" c:lang="en">
    <title>XML Developer's Guide</title>
    <authors>
      <author><name>Gambardella, Matthew</name></author>
    </authors>
    <price currency="USD"><amount>44.95</amount></price>
    <published>2000-10-01</published>
  </book>
  <book id="bk102">
    <title>Midnight Rain</title>
    <authors>
      <author><name>Ralls, Kim</name></author>
      <author><name>Corets, Eva</name></author>
    </authors>
    <price currency="EUR"><amount>5.95</amount></price>
    <published>2000-12-16</published>
  </book>
  <book id="bk103">
    <title>Untitled Draft</title>
  </book>
</catalog>
"#;

#[derive(Debug, Clone)]
struct Author(String);

#[derive(Debug, Clone)]
struct Price {
    amount: f64,
    currency: String,
}

#[derive(Debug, Clone)]
struct Book {
    id: String,
    lang: Option<String>,
    title: String,
    authors: Vec<String>,
    price: Option<Price>,
    published: Option<NaiveDate>,
}

#[derive(Debug, Clone)]
struct Catalog {
    books: Vec<Book>,
}

/// Counts how many books were mapped in a run.
#[derive(Default)]
struct Library {
    mapped: usize,
}

fn build() -> xmlmap_rs::Result<Engine<Catalog>> {
    Engine::<Catalog>::builder()
        .controller::<Library>()
        .configure::<Library>(xmlmap_rs::ControllerConfig::new().with_namespaces(
            xmlmap_rs::Namespaces::new().with_prefix("cat", "urn:example:catalog"),
        ))
        .on::<Library>("author")
        .content::<String>("name")
        .handle(|_, args| Ok(Author(args.required::<String>(0)?)))
        .on::<Library>("price")
        .attribute::<String>("currency")
        .content::<f64>("amount")
        .handle(|_, args| {
            Ok(Price {
                currency: args.required(0)?,
                amount: args.required(1)?,
            })
        })
        .on::<Library>("book")
        .attribute::<String>("id")
        .attribute::<String>("cat:lang")
        .optional()
        .content::<String>("title")
        .results::<Author>()
        .optional()
        .result::<Price>()
        .optional()
        .content::<NaiveDate>("published")
        .optional()
        .handle(|library, args| {
            library.mapped += 1;
            Ok(Book {
                id: args.required(0)?,
                lang: args.take(1)?,
                title: args.required(2)?,
                authors: args
                    .take_list::<Author>(3)?
                    .into_iter()
                    .map(|a| a.0)
                    .collect(),
                price: args.take(4)?,
                published: args.take(5)?,
            })
        })
        .on::<Library>("catalog")
        .results::<Book>()
        .optional()
        .handle(|library, args| {
            let books = args.take_list::<Book>(0)?;
            if books.len() != library.mapped {
                return Err(CallbackError::user(format!(
                    "mapped {} books but collected {}",
                    library.mapped,
                    books.len()
                )));
            }
            Ok(Catalog { books })
        })
        .build()
}

fn main() -> Result<(), Box<dyn std::error::Error>> {
    env_logger::init();

    let engine = build()?;
    let catalog = match env::args().nth(1) {
        Some(path) => engine.run_file(&path)?,
        None => engine.run_str(SAMPLE)?,
    };

    let mut totals: Vec<(String, f64)> = Vec::new();
    for book in &catalog.books {
        let price = match &book.price {
            Some(p) => {
                match totals.iter_mut().find(|(c, _)| c == &p.currency) {
                    Some((_, sum)) => *sum += p.amount,
                    None => totals.push((p.currency.clone(), p.amount)),
                }
                format!("{:.2} {}", p.amount, p.currency)
            }
            None => "-".to_string(),
        };
        let published = book
            .published
            .map(|d| d.format("%Y-%m-%d").to_string())
            .unwrap_or_else(|| "-".to_string());

        println!(
            "{:<6} {:<24} {:<10} {:<12} [{}] {}",
            book.id,
            book.title,
            price,
            published,
            book.lang.as_deref().unwrap_or("?"),
            book.authors.join("; ")
        );
    }

    println!();
    println!("{} book(s)", catalog.books.len());
    for (currency, sum) in totals {
        println!("  {:.2} {}", sum, currency);
    }
    Ok(())
}
