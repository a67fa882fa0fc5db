use std::fs;
use std::path::Path;

use roi::{
    ImageHandle, MaskOptions, PaintOptions, RegionFilterSpec, ResizeOptions, ResizeSpec, SaveOptions, Segmentation,
};
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::info;

#[derive(Error, Debug)]
pub enum CliError {
    #[error(transparent)]
    SerdeError(#[from] serde_json::Error),
    #[error(transparent)]
    TomlDeError(#[from] toml::de::Error),
    #[error(transparent)]
    TomlSerError(#[from] toml::ser::Error),
    #[error(transparent)]
    IoError(#[from] std::io::Error),
    #[error(transparent)]
    Roi(#[from] roi::RoiError),
    #[error("Job '{0}' has no input image")]
    MissingInput(String),
    #[error("Task '{task}' failed: {source}")]
    TaskFailed {
        task: String,
        #[source]
        source: Box<CliError>,
    },
    #[error("Unsupported file format. Please use .toml or .json files")]
    UnsupportedFileFormat,
}

/// Files a job writes next to each other in its output directory.
#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema, PartialEq)]
#[serde(default)]
pub struct Outputs {
    /// `mask.png`, the rendered mask
    pub mask: bool,
    /// `crop_<n>.png` per region
    pub crops: bool,
    /// `overlay.png`, region outlines painted on the input
    pub overlay: bool,
    /// `cutout.png`, input with everything outside the mask transparent
    pub transparent: bool,
    /// `stats.json`
    pub stats: bool,
    /// `regions.geojson`
    pub geojson: bool,
}

impl Default for Outputs {
    fn default() -> Self {
        Self {
            mask: true,
            crops: false,
            overlay: false,
            transparent: false,
            stats: true,
            geojson: false,
        }
    }
}

/// One image to segment and what to write for it.
#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema, PartialEq)]
pub struct Task {
    pub name: String,
    pub input: String,
    /// Optional resize applied before masking, e.g. `"50%"` or `"800x"`.
    pub resize: Option<String>,
    /// Overrides the job-level mask options.
    pub mask: Option<MaskOptions>,
    /// Overrides the job-level region filter.
    pub filter: Option<RegionFilterSpec>,
}

/// Batch segmentation job configuration
#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema, PartialEq)]
pub struct Job {
    pub output_dir: String,
    #[serde(default)]
    pub mask: MaskOptions,
    #[serde(default)]
    pub filter: RegionFilterSpec,
    #[serde(default)]
    pub paint: PaintOptions,
    #[serde(default)]
    pub save: SaveOptions,
    #[serde(default)]
    pub outputs: Outputs,
    pub tasks: Vec<Task>,
}

impl Task {
    pub fn mask_options<'a>(&'a self, job: &'a Job) -> &'a MaskOptions {
        self.mask.as_ref().unwrap_or(&job.mask)
    }

    pub fn filter(&self, job: &Job) -> RegionFilterSpec {
        self.filter.unwrap_or(job.filter)
    }

    pub fn resize_spec(&self) -> Result<Option<ResizeSpec>, CliError> {
        Ok(self.resize.as_deref().map(str::parse::<ResizeSpec>).transpose()?)
    }
}

impl Job {
    /// Load Job configuration from a TOML file
    pub fn from_toml_file<P: AsRef<Path>>(path: P) -> Result<Self, CliError> {
        let content = fs::read_to_string(path)?;
        Self::from_toml(&content)
    }

    pub fn from_toml(content: &str) -> Result<Self, CliError> {
        let job: Job = toml::from_str(content)?;
        job.validate()?;
        Ok(job)
    }

    /// Load Job configuration from a JSON file
    pub fn from_json_file<P: AsRef<Path>>(path: P) -> Result<Self, CliError> {
        let content = fs::read_to_string(path)?;
        Self::from_json(&content)
    }

    pub fn from_json(content: &str) -> Result<Self, CliError> {
        let job: Job = serde_json::from_str(content)?;
        job.validate()?;
        Ok(job)
    }

    /// Auto-detect file format and load configuration
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self, CliError> {
        let path_ref = path.as_ref();
        match path_ref.extension().and_then(|ext| ext.to_str()) {
            Some("toml") => Self::from_toml_file(path),
            Some("json") => Self::from_json_file(path),
            _ => Err(CliError::UnsupportedFileFormat),
        }
    }

    pub fn to_toml(&self) -> Result<String, CliError> {
        Ok(toml::to_string_pretty(&self)?)
    }

    pub fn to_json(&self) -> Result<String, CliError> {
        Ok(serde_json::to_string_pretty(&self)?)
    }

    /// Parse every option name up front so a bad task fails before any
    /// image is touched.
    fn validate(&self) -> Result<(), CliError> {
        roi::MaskSpec::try_from(&self.mask)?;
        self.filter.validate()?;
        for task in &self.tasks {
            if task.input.trim().is_empty() {
                return Err(CliError::MissingInput(task.name.clone()));
            }
            roi::MaskSpec::try_from(task.mask_options(self))?;
            task.filter(self).validate()?;
            task.resize_spec()?;
        }
        Ok(())
    }

    /// Run every task. All outputs are rendered in memory first; the output
    /// directory is only written once every task has succeeded.
    pub fn run(&self) -> Result<(), CliError> {
        info!("Running job with {} tasks", self.tasks.len());

        let mut rendered = Vec::with_capacity(self.tasks.len());
        for task in &self.tasks {
            let artifacts = render_task(self, task).map_err(|source| CliError::TaskFailed {
                task: task.name.clone(),
                source: Box::new(source),
            })?;
            rendered.push((task, artifacts));
        }

        for (task, artifacts) in rendered {
            let output_dir = Path::new(&self.output_dir).join(&task.name);
            info!("Writing task '{}' -> {}", task.name, output_dir.display());
            write_artifacts(&output_dir, artifacts, &self.save)?;
        }

        info!("Job completed");
        Ok(())
    }
}

/// One output file, held in memory until the whole job has succeeded.
enum Artifact {
    Image(ImageHandle),
    Text(String),
}

fn render_task(job: &Job, task: &Task) -> Result<Vec<(String, Artifact)>, CliError> {
    let mut image = ImageHandle::load(&task.input)?;
    if let Some(spec) = task.resize_spec()? {
        image.resize(&spec, &ResizeOptions::default())?;
    }

    let mask = image.create_mask_with(task.mask_options(job))?;
    let regions = mask.regions(&task.filter(job))?;
    info!("Task '{}': {} regions", task.name, regions.len());

    let outputs = &job.outputs;
    let mut artifacts = Vec::new();
    if outputs.crops {
        let passthrough = RegionFilterSpec::default();
        for (i, crop) in image.split(&regions, &passthrough)?.into_iter().enumerate() {
            artifacts.push((format!("crop_{i}.png"), Artifact::Image(crop)));
        }
    }
    if outputs.overlay {
        let overlay = image.paint_regions(&regions, &job.paint)?;
        artifacts.push(("overlay.png".to_string(), Artifact::Image(overlay)));
    }
    if outputs.transparent {
        artifacts.push(("cutout.png".to_string(), Artifact::Image(image.transparent(&mask)?)));
    }
    if outputs.stats {
        let stats = image.analyze(&regions, &RegionFilterSpec::default())?;
        artifacts.push(("stats.json".to_string(), Artifact::Text(serde_json::to_string_pretty(&stats)?)));
    }
    if outputs.geojson {
        let segmentation = Segmentation {
            mask: mask.clone(),
            regions,
            image_width: image.width(),
            image_height: image.height(),
        };
        artifacts.push(("regions.geojson".to_string(), Artifact::Text(segmentation.to_geojson_string()?)));
    }
    if outputs.mask {
        artifacts.push(("mask.png".to_string(), Artifact::Image(mask)));
    }
    Ok(artifacts)
}

fn write_artifacts(output_dir: &Path, artifacts: Vec<(String, Artifact)>, save: &SaveOptions) -> Result<(), CliError> {
    fs::create_dir_all(output_dir)?;
    for (name, artifact) in artifacts {
        let path = output_dir.join(name);
        match artifact {
            Artifact::Image(image) => image.save(&path, save)?,
            Artifact::Text(text) => fs::write(&path, text)?,
        }
    }
    Ok(())
}

/// JSON schema of the job file format.
pub fn job_schema() -> Result<String, CliError> {
    let schema = schemars::schema_for!(Job);
    Ok(serde_json::to_string_pretty(&schema)?)
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::{DynamicImage, GrayImage, Luma};
    use roi::SortKey;

    const TOML_JOB: &str = r##"
output_dir = "out"

[mask]
method = "Otsu"
imageFilter = "hue"

[filter]
minSurface = 100.0
sortBy = "surface"

[paint]
strokeColor = "#00ff00"

[outputs]
crops = true

[[tasks]]
name = "plate"
input = "plate.png"
resize = "50%"

[[tasks]]
name = "dish"
input = "dish.jpg"
mask = { method = "Yen", darkBackground = false }
"##;

    #[test]
    fn toml_job_parses_with_defaults() {
        let job = Job::from_toml(TOML_JOB).unwrap();
        assert_eq!(job.tasks.len(), 2);
        assert_eq!(job.filter.min_surface, Some(100.0));
        assert_eq!(job.filter.sort_by, Some(SortKey::Surface));
        assert_eq!(job.paint.stroke_color, roi::Color([0, 255, 0]));
        assert_eq!(job.paint.stroke_size, 3);
        assert_eq!(job.save.quality, 100);
        assert!(job.outputs.crops && job.outputs.mask && job.outputs.stats);
        assert!(!job.outputs.geojson);

        let plate = &job.tasks[0];
        assert_eq!(plate.resize_spec().unwrap(), Some(ResizeSpec::Percent(50.0)));
        assert_eq!(plate.mask_options(&job).method.as_deref(), Some("Otsu"));
        let dish = &job.tasks[1];
        assert_eq!(dish.mask_options(&job).dark_background, Some(false));
        assert_eq!(dish.filter(&job).min_surface, Some(100.0));
    }

    #[test]
    fn json_round_trips() {
        let job = Job::from_toml(TOML_JOB).unwrap();
        let reparsed = Job::from_json(&job.to_json().unwrap()).unwrap();
        assert_eq!(reparsed, job);
    }

    #[test]
    fn bad_option_names_fail_at_load() {
        let job = TOML_JOB.replace("\"Yen\"", "\"Guess\"");
        assert!(matches!(Job::from_toml(&job), Err(CliError::Roi(_))));
        let job = TOML_JOB.replace("\"50%\"", "\"fifty\"");
        assert!(matches!(Job::from_toml(&job), Err(CliError::Roi(_))));
    }

    #[test]
    fn zero_scale_fails_at_load() {
        let job = TOML_JOB.replace("minSurface = 100.0", "scale = 0.0");
        assert!(matches!(Job::from_toml(&job), Err(CliError::Roi(_))));

        let job = TOML_JOB.replace(
            "mask = { method = \"Yen\", darkBackground = false }",
            "filter = { scale = -2.0 }",
        );
        assert!(matches!(Job::from_toml(&job), Err(CliError::Roi(_))));
    }

    /// A 40x40 image with one bright 10x10 square at (10, 10).
    fn write_square(path: &Path) {
        let pixels = GrayImage::from_fn(40, 40, |x, y| {
            let inside = (10..20).contains(&x) && (10..20).contains(&y);
            Luma([if inside { 255 } else { 0 }])
        });
        ImageHandle::new(DynamicImage::ImageLuma8(pixels))
            .save(path, &SaveOptions::default())
            .unwrap();
    }

    fn job_for(output_dir: &Path, tasks: &[(&str, &Path)]) -> Job {
        let mut config = format!("output_dir = '{}'\n\n[outputs]\ngeojson = true\n", output_dir.display());
        for (name, input) in tasks {
            config.push_str(&format!("\n[[tasks]]\nname = '{name}'\ninput = '{}'\n", input.display()));
        }
        Job::from_toml(&config).unwrap()
    }

    #[test]
    fn run_writes_every_enabled_output() {
        let dir = tempfile::tempdir().unwrap();
        let input = dir.path().join("square.png");
        write_square(&input);
        let output_dir = dir.path().join("out");

        job_for(&output_dir, &[("square", input.as_path())]).run().unwrap();

        let task_dir = output_dir.join("square");
        assert!(task_dir.join("mask.png").is_file());
        assert!(task_dir.join("regions.geojson").is_file());
        let stats: serde_json::Value =
            serde_json::from_str(&fs::read_to_string(task_dir.join("stats.json")).unwrap()).unwrap();
        assert_eq!(stats.as_array().unwrap().len(), 1);
        assert_eq!(stats[0]["width"], 10);
    }

    #[test]
    fn missing_input_fails_the_job_and_writes_nothing() {
        let dir = tempfile::tempdir().unwrap();
        let input = dir.path().join("square.png");
        write_square(&input);
        let output_dir = dir.path().join("out");
        let missing = dir.path().join("does-not-exist.png");

        let job = job_for(&output_dir, &[("square", input.as_path()), ("missing", missing.as_path())]);
        match job.run() {
            Err(CliError::TaskFailed { task, source }) => {
                assert_eq!(task, "missing");
                assert!(matches!(*source, CliError::Roi(_)));
            }
            other => panic!("expected a task failure, got {other:?}"),
        }
        assert!(!output_dir.exists());
    }

    #[test]
    fn unknown_extensions_are_rejected() {
        assert!(matches!(Job::from_file("job.yaml"), Err(CliError::UnsupportedFileFormat)));
    }

    #[test]
    fn schema_lists_job_fields() {
        let schema = job_schema().unwrap();
        assert!(schema.contains("output_dir"));
        assert!(schema.contains("minSurface"));
    }
}
