//! Demo: fold self-nested `<node>` elements into a typed tree.
//!
//! Every `<node>` level is invoked on its own, innermost first, and
//! receives the trees built for its direct children. The outermost tree is
//! the run's result.
//!
//! Run with: cargo run --example demo_tree [tree.xml]

use std::env;

use xmlmap_rs::Engine;

const SAMPLE: &str = r#"<?xml version="1.0"?>
<node name="root">
  <label>Root of everything</label>
  <node name="a" weight="3">
    <node name="a1" weight="1"><label>first leaf</label></node>
    <node name="a2" weight="2"/>
  </node>
  <node name="b">
    <node name="b1" weight="5">
      <node name="b1x" weight="8"><label>deepest</label></node>
    </node>
  </node>
</node>
"#;

#[derive(Debug, Clone)]
struct Tree {
    name: String,
    label: Option<String>,
    weight: u32,
    order: usize,
    children: Vec<Tree>,
}

impl Tree {
    fn depth(&self) -> usize {
        1 + self.children.iter().map(Tree::depth).max().unwrap_or(0)
    }

    fn total_weight(&self) -> u32 {
        self.weight + self.children.iter().map(Tree::total_weight).sum::<u32>()
    }

    fn count(&self) -> usize {
        1 + self.children.iter().map(Tree::count).sum::<usize>()
    }

    fn print(&self, indent: usize) {
        println!(
            "{:indent$}#{} {} (w={}, subtotal={}){}",
            "",
            self.order,
            self.name,
            self.weight,
            self.total_weight(),
            self.label
                .as_ref()
                .map(|l| format!(" \"{}\"", l))
                .unwrap_or_default(),
            indent = indent * 2
        );
        for child in &self.children {
            child.print(indent + 1);
        }
    }
}

/// Numbers nodes in the order their callbacks run.
#[derive(Default)]
struct Stats {
    invoked: usize,
}

fn main() -> Result<(), Box<dyn std::error::Error>> {
    env_logger::init();

    let engine = Engine::<Tree>::builder()
        .controller::<Stats>()
        .on::<Stats>("node")
        .recursive()
        .attribute::<String>("name")
        .attribute::<u32>("weight")
        .optional()
        .content::<String>("label")
        .optional()
        .results_from::<Tree>("node")
        .optional()
        .handle(|stats, args| {
            stats.invoked += 1;
            Ok(Tree {
                name: args.required(0)?,
                weight: args.take::<u32>(1)?.unwrap_or(0),
                label: args.take(2)?,
                order: stats.invoked,
                children: args.take_list::<Tree>(3)?,
            })
        })
        .build()?;

    let tree = match env::args().nth(1) {
        Some(path) => engine.run_file(&path)?,
        None => engine.run_str(SAMPLE)?,
    };

    tree.print(0);
    println!();
    println!("nodes:        {}", tree.count());
    println!("depth:        {}", tree.depth());
    println!("total weight: {}", tree.total_weight());
    Ok(())
}
