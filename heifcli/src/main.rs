use std::fs::File;
use std::io::Write;
use std::process::exit;

use anyhow::{anyhow, Result};
use clap;
use structopt::StructOpt;

use heiflib::reader::META_CONTEXT_ID;
use heiflib::writer::manifest::Manifest;
use heiflib::{Error, FileWriter, Heif, HeifFile, HeifReader};

#[derive(StructOpt, Debug)]
#[structopt(setting = clap::AppSettings::VersionlessSubcommands)]
pub struct MainOpts {
    #[structopt(long)]
    /// Log options (like RUST_LOG; trace, debug, info etc)
    pub log: Option<String>,
    #[structopt(subcommand)]
    pub cmd: Command,
}

#[derive(StructOpt, Debug)]
#[structopt(rename_all = "kebab-case")]
pub enum Command {
    #[structopt(display_order = 1)]
    /// File and context information.
    Info(InfoOpts),

    #[structopt(display_order = 2)]
    /// List the items of a context.
    Items(ItemsOpts),

    #[structopt(display_order = 3)]
    /// Track information.
    Tracks(TracksOpts),

    #[structopt(display_order = 4)]
    /// Show the box structure.
    Boxes(BoxesOpts),

    #[structopt(display_order = 5)]
    /// Extract an item as an Annex-B bitstream.
    Extract(ExtractOpts),

    #[structopt(display_order = 6)]
    /// Write a HEIF file from a JSON content manifest.
    Write(WriteOpts),
}

#[derive(StructOpt, Debug)]
pub struct InfoOpts {
    #[structopt(short, long)]
    /// Output in JSON.
    pub json: bool,

    /// Input filename.
    pub input: String,
}

#[derive(StructOpt, Debug)]
pub struct ItemsOpts {
    #[structopt(short, long, default_value = "0")]
    /// Context id (0 = meta box, track id otherwise).
    pub context: u32,

    #[structopt(short, long, default_value = "master")]
    /// Item type filter ('master', 'thumb', 'aux', 'hidden', or a fourcc).
    pub item_type: String,

    /// Input filename.
    pub input: String,
}

#[derive(StructOpt, Debug)]
pub struct TracksOpts {
    #[structopt(short, long)]
    /// Output in JSON.
    pub json: bool,

    /// Input filename.
    pub input: String,
}

#[derive(StructOpt, Debug)]
pub struct BoxesOpts {
    /// Input filename.
    pub input: String,
}

#[derive(StructOpt, Debug)]
pub struct ExtractOpts {
    #[structopt(short, long, default_value = "0")]
    /// Context id.
    pub context: u32,

    #[structopt(short, long)]
    /// Item id; default is the cover image.
    pub item: Option<u32>,

    /// Input filename.
    pub input: String,

    /// Output filename.
    pub output: String,
}

#[derive(StructOpt, Debug)]
pub struct WriteOpts {
    /// Manifest filename (JSON).
    pub manifest: String,
}

fn main() {
    let opts = MainOpts::from_args();

    let mut builder = env_logger::Builder::new();
    if let Some(ref log_opts) = opts.log {
        builder.parse_filters(log_opts);
    } else if let Ok(ref log_opts) = std::env::var("RUST_LOG") {
        builder.parse_filters(log_opts);
    } else {
        builder.parse_filters("info");
    }
    builder.init();

    let r = match opts.cmd {
        Command::Info(opts) => info(opts),
        Command::Items(opts) => items(opts),
        Command::Tracks(opts) => tracks(opts),
        Command::Boxes(opts) => boxes(opts),
        Command::Extract(opts) => extract(opts),
        Command::Write(opts) => write(opts),
    };
    match r {
        Ok(()) => {},
        Err(e) => {
            eprintln!("heif: {:#}", e);
            exit(exit_code(&e));
        },
    }
}

// 0 success, 1 usage, 2 unreadable input, 3 unsupported code type.
fn exit_code(e: &anyhow::Error) -> i32 {
    match e.downcast_ref::<Error>() {
        Some(Error::UnknownCodeType(_)) => 3,
        Some(Error::UnsupportedFeature(_)) => 3,
        Some(_) => 2,
        None => {
            if e.downcast_ref::<std::io::Error>().is_some() {
                2
            } else {
                1
            }
        },
    }
}

fn info(opts: InfoOpts) -> Result<()> {
    let reader = HeifReader::open(&opts.input)?;
    let props = reader.get_file_properties()?;
    if opts.json {
        println!("{}", serde_json::to_string_pretty(props)?);
        return Ok(());
    }
    println!("major brand:      {}", reader.get_major_brand()?);
    println!(
        "compatible:       {}",
        reader.get_compatible_brands()?.join(", ")
    );
    println!("single image:     {}", props.has_single_image);
    println!("image collection: {}", props.has_image_collection);
    println!("image sequence:   {}", props.has_image_sequence);
    println!("cover image:      {}", props.has_cover_image);
    if let Some(meta) = props.meta_context.as_ref() {
        println!("meta context {}:", meta.context_id);
        println!("  masters:    {}", meta.has_master_images);
        println!("  thumbnails: {}", meta.has_thumbnails);
        println!("  auxiliary:  {}", meta.has_auxiliary_images);
        println!("  derived:    {}", meta.has_derived_images);
        println!("  hidden:     {}", meta.has_hidden_images);
        println!("  metadata:   {}", meta.has_item_metadata);
    }
    for t in &props.tracks {
        println!(
            "track context {}: handler {}, {} samples{}",
            t.context_id,
            t.handler,
            t.sample_count,
            if t.is_alternate { ", alternate" } else { "" }
        );
    }
    Ok(())
}

fn items(opts: ItemsOpts) -> Result<()> {
    let reader = HeifReader::open(&opts.input)?;
    let ids = reader.get_item_list_by_type(opts.context, &opts.item_type)?;
    for id in ids {
        let t = reader.get_item_type(opts.context, id)?;
        let dims = reader
            .get_width(opts.context, id)
            .and_then(|w| reader.get_height(opts.context, id).map(|h| (w, h)))
            .ok();
        match dims {
            Some((w, h)) => println!("{}\t{}\t{}x{}", id, t, w, h),
            None => println!("{}\t{}", id, t),
        }
    }
    Ok(())
}

fn tracks(opts: TracksOpts) -> Result<()> {
    let mut file = HeifFile::open(&opts.input)?;
    let heif = Heif::read(&mut file)?;
    let movie = heif
        .movie()
        .ok_or_else(|| anyhow!("{}: no tracks in this file", opts.input))?;
    let info = heiflib::track::track_info(movie);
    if opts.json {
        println!("{}", serde_json::to_string_pretty(&info)?);
    } else {
        println!("{:#?}", info);
    }
    Ok(())
}

fn boxes(opts: BoxesOpts) -> Result<()> {
    let mut file = HeifFile::open(&opts.input)?;
    let heif = Heif::read(&mut file)?;
    println!("{:#?}", heif);
    Ok(())
}

fn extract(opts: ExtractOpts) -> Result<()> {
    let reader = HeifReader::open(&opts.input)?;
    let item = match opts.item {
        Some(item) => item,
        None => reader.get_cover_image_item_id(META_CONTEXT_ID)?,
    };
    let data = reader.get_item_data_with_decoder_parameters(opts.context, item)?;
    let mut out = File::create(&opts.output)?;
    out.write_all(&data)?;
    println!(
        "{}: wrote item {} ({} bytes)",
        opts.output,
        item,
        data.len()
    );
    Ok(())
}

fn write(opts: WriteOpts) -> Result<()> {
    let manifest = Manifest::from_json_file(&opts.manifest)?;
    FileWriter::write_file(&manifest)?;
    println!("{}: written", manifest.output_path);
    Ok(())
}
