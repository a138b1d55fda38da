use std::path::PathBuf;

use argh::FromArgs;

use dito_core::{lookup_description, try_read_image_description_data, ImageDescriptionData};

#[derive(FromArgs, Debug)]
/// Print the cached description of images, or a description made from their file name.
struct Args {
    /// path to the JSON image description data file
    #[argh(positional)]
    image_description_data_file_path: PathBuf,

    /// image paths, relative to the described image folder
    #[argh(positional)]
    image_file_paths: Vec<String>,
}

/// One line per image, in the given order.
fn description_lines(data: &ImageDescriptionData, image_file_paths: &[String]) -> Vec<String> {
    image_file_paths
        .iter()
        .map(|image_file_path| lookup_description(data, image_file_path))
        .collect()
}

fn main() -> Result<(), Box<dyn std::error::Error>> {
    env_logger::init();

    let args: Args = argh::from_env();

    let data = try_read_image_description_data(&args.image_description_data_file_path)?
        .unwrap_or_default();

    for line in description_lines(&data, &args.image_file_paths) {
        println!("{line}");
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn lines_hold_only_the_descriptions() {
        let mut data = ImageDescriptionData::new();
        data.entry("pets/".to_string())
            .or_default()
            .insert("cat".to_string(), "a cat on a sofa".to_string());

        let lines = description_lines(
            &data,
            &["pets/cat.png".to_string(), "pets/old_dog.jpg".to_string()],
        );

        assert_eq!(lines, vec!["a cat on a sofa", "old dog"]);
    }
}
