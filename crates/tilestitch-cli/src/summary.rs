use console::Style;
use tilestitch_core::pipeline::config::StitchConfig;
use tilestitch_core::pipeline::StitchOutput;
use tilestitch_core::rescale::{RescaleMode, RescaleRange};

struct Styles {
    title: Style,
    header: Style,
    label: Style,
    value: Style,
    method: Style,
    disabled: Style,
    warning: Style,
    path: Style,
}

impl Styles {
    fn new() -> Self {
        Self {
            title: Style::new().cyan().bold(),
            header: Style::new().cyan().bold(),
            label: Style::new().dim(),
            value: Style::new().bold().white(),
            method: Style::new().green(),
            disabled: Style::new().dim().yellow(),
            warning: Style::new().yellow().bold(),
            path: Style::new().underlined(),
        }
    }
}

pub fn print_stitch_summary(config: &StitchConfig) {
    let s = Styles::new();

    println!();
    println!("  {}", s.title.apply_to("Tile Stitching"));
    println!("  {}", s.title.apply_to("\u{2550}".repeat(14)));
    println!();

    println!(
        "  {:<14}{}",
        s.label.apply_to("Input"),
        s.path.apply_to(config.input_dir.display())
    );
    println!(
        "  {:<14}{}",
        s.label.apply_to("Pattern"),
        s.value.apply_to(&config.pattern)
    );
    println!(
        "  {:<14}{}",
        s.label.apply_to("Slide"),
        s.value.apply_to(&config.slide_name)
    );
    println!(
        "  {:<14}{}",
        s.label.apply_to("Output"),
        s.path.apply_to(config.output_dir.display())
    );
    let formats: Vec<String> = config.formats().iter().map(|f| f.to_string()).collect();
    println!(
        "  {:<14}{}",
        s.label.apply_to("Formats"),
        s.method.apply_to(formats.join(", "))
    );
    println!();

    println!("  {}", s.header.apply_to("Alignment"));
    println!(
        "    {:<12}{}",
        s.label.apply_to("Method"),
        s.method.apply_to(&config.alignment.method)
    );
    println!(
        "    {:<12}{}",
        s.label.apply_to("Channel"),
        s.value.apply_to(&config.alignment.stitching_channel)
    );
    println!(
        "    {:<12}{}",
        s.label.apply_to("Overlap"),
        s.value.apply_to(format!("{:.0}%", config.overlap * 100.0))
    );
    println!(
        "    {:<12}{}",
        s.label.apply_to("Max shift"),
        s.value.apply_to(format!("{} px", config.alignment.max_shift))
    );
    if config.alignment.filter_sigma > 0.0 {
        println!(
            "    {:<12}{}",
            s.label.apply_to("Filter"),
            s.value.apply_to(format!("sigma {}", config.alignment.filter_sigma))
        );
    }
    println!();

    println!("  {}", s.header.apply_to("Rescale"));
    if config.rescale.mode == RescaleMode::Off {
        println!(
            "    {:<12}{}",
            s.label.apply_to("Mode"),
            s.disabled.apply_to("disabled")
        );
    } else {
        println!(
            "    {:<12}{}",
            s.label.apply_to("Mode"),
            s.method.apply_to(config.rescale.mode)
        );
        match &config.rescale.range {
            RescaleRange::Uniform(pair) => println!(
                "    {:<12}{}",
                s.label.apply_to("Range"),
                s.value.apply_to(pair)
            ),
            RescaleRange::PerChannel(map) => {
                for (name, pair) in map {
                    println!(
                        "    {:<12}{}",
                        s.label.apply_to(name),
                        s.value.apply_to(pair)
                    );
                }
            }
        }
        if let Some(ref excluded) = config.rescale.exclude_channels {
            println!(
                "    {:<12}{}",
                s.label.apply_to("Excluded"),
                s.value.apply_to(excluded.join(", "))
            );
        }
    }
    println!();

    if !config.crop.is_zero() {
        println!(
            "  {:<14}{}",
            s.header.apply_to("Crop"),
            s.value.apply_to(&config.crop)
        );
        println!();
    }
}

pub fn print_stitch_result(output: &StitchOutput) {
    let s = Styles::new();

    println!();
    println!(
        "  {:<14}{}",
        s.label.apply_to("Channels"),
        s.value.apply_to(output.channels.join(", "))
    );
    println!(
        "  {:<14}{}",
        s.label.apply_to("Mosaic"),
        s.value
            .apply_to(format!("{}x{}", output.mosaic_shape.1, output.mosaic_shape.0))
    );
    if output.cropped {
        println!(
            "  {:<14}{}",
            s.label.apply_to("Cropped"),
            s.value
                .apply_to(format!("{}x{}", output.output_shape.1, output.output_shape.0))
        );
    }
    if output.failed_total > 0 {
        let coords: Vec<String> = output.failed.iter().map(|c| c.to_string()).collect();
        let more = output.failed_total.saturating_sub(output.failed.len());
        let suffix = if more > 0 {
            format!(" (+{more} more)")
        } else {
            String::new()
        };
        println!(
            "  {:<14}{}",
            s.warning.apply_to("Unaligned"),
            s.warning
                .apply_to(format!("{} tile(s): {}{suffix}", output.failed_total, coords.join(" ")))
        );
    }
    for path in &output.written {
        println!(
            "  {:<14}{}",
            s.label.apply_to("Wrote"),
            s.path.apply_to(path.display())
        );
    }
    println!();
}
