use std::path::Path;

use geojson::{Feature, FeatureCollection, Geometry, Value};
use serde_json::{Map, Number, Value as JsonValue};

use crate::{
    error::{Result, RoiError},
    pipeline::Segmentation,
    types::Region,
};

/// Closed ring around a region's bounding box, in pixel coordinates.
fn bbox_ring(region: &Region) -> Vec<Vec<f64>> {
    let (x0, y0) = (region.x() as f64, region.y() as f64);
    let (x1, y1) = (x0 + region.width() as f64, y0 + region.height() as f64);
    vec![
        vec![x0, y0],
        vec![x1, y0],
        vec![x1, y1],
        vec![x0, y1],
        vec![x0, y0],
    ]
}

fn number(value: f64) -> JsonValue {
    Number::from_f64(value).map_or(JsonValue::Null, JsonValue::Number)
}

impl Segmentation {
    /// One polygon feature per region, carrying its statistics as
    /// properties. The image size and region count go into the collection's
    /// foreign members.
    pub fn to_geojson(&self) -> Result<FeatureCollection> {
        let mut features = Vec::with_capacity(self.regions.len());

        for (i, region) in self.regions.iter().enumerate() {
            let geometry = Geometry::new(Value::Polygon(vec![bbox_ring(region)]));

            let mut properties = match serde_json::to_value(region.to_stats())? {
                JsonValue::Object(map) => map,
                other => {
                    return Err(RoiError::EngineFailure(format!(
                        "region stats serialized to {other}, expected an object"
                    )));
                }
            };
            properties.insert("id".to_string(), JsonValue::Number(Number::from(i)));
            properties.insert("length".to_string(), JsonValue::Number(Number::from(region.length())));
            properties.insert("contourPerSurface".to_string(), number(region.contour_length() / region.surface()));

            features.push(Feature {
                bbox: Some(vec![
                    region.x() as f64,
                    region.y() as f64,
                    region.x().saturating_add(region.width()) as f64,
                    region.y().saturating_add(region.height()) as f64,
                ]),
                geometry: Some(geometry),
                id: Some(geojson::feature::Id::Number(Number::from(i))),
                properties: Some(properties),
                foreign_members: None,
            });
        }

        let mut foreign_members = Map::new();
        foreign_members.insert("image_width".to_string(), JsonValue::Number(Number::from(self.image_width)));
        foreign_members.insert("image_height".to_string(), JsonValue::Number(Number::from(self.image_height)));
        foreign_members.insert("region_count".to_string(), JsonValue::Number(Number::from(self.regions.len())));

        Ok(FeatureCollection {
            bbox: None,
            features,
            foreign_members: Some(foreign_members),
        })
    }

    pub fn to_geojson_string(&self) -> Result<String> {
        let geojson = self.to_geojson()?;
        Ok(serde_json::to_string_pretty(&geojson)?)
    }

    pub fn save_geojson(&self, path: impl AsRef<Path>) -> Result<()> {
        let path = path.as_ref();
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            std::fs::create_dir_all(parent)?;
        }
        std::fs::write(path, self.to_geojson_string()?)?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use crate::{
        options::SortKey,
        pipeline::{Pipeline, Segmentation},
        test_support::blobs,
        types::Region,
    };

    #[test]
    fn one_feature_per_region_with_bbox_polygon() {
        let image = blobs(100, 60, &[(60, 10, 20, 10), (5, 30, 10, 20)]);
        let segmentation = Pipeline::builder().sort_by(SortKey::X).build().process(&image).unwrap();
        let collection = segmentation.to_geojson().unwrap();
        assert_eq!(collection.features.len(), 2);

        let first = &collection.features[0];
        let properties = first.properties.as_ref().unwrap();
        assert_eq!(properties["x"], 5);
        assert_eq!(properties["surface"], 200.0);
        assert_eq!(properties["length"], 20);
        match &first.geometry.as_ref().unwrap().value {
            geojson::Value::Polygon(rings) => {
                assert_eq!(rings[0].len(), 5);
                assert_eq!(rings[0][2], vec![15.0, 50.0]);
            }
            other => panic!("unexpected geometry {other:?}"),
        }

        let members = collection.foreign_members.as_ref().unwrap();
        assert_eq!(members["image_width"], 100);
        assert_eq!(members["region_count"], 2);
    }

    #[test]
    fn string_form_parses_back() {
        let segmentation = Pipeline::default().process(&blobs(20, 20, &[(2, 2, 4, 4)])).unwrap();
        let text = segmentation.to_geojson_string().unwrap();
        let parsed: geojson::GeoJson = text.parse().unwrap();
        assert!(matches!(parsed, geojson::GeoJson::FeatureCollection(ref fc) if fc.features.len() == 1));
    }

    #[test]
    fn bbox_at_the_coordinate_limit_saturates() {
        let segmentation = Segmentation {
            mask: blobs(4, 4, &[]),
            regions: vec![Region::rectangle(u32::MAX - 5, 0, 10, 2)],
            image_width: 4,
            image_height: 4,
        };
        let collection = segmentation.to_geojson().unwrap();
        let bbox = collection.features[0].bbox.as_ref().unwrap();
        assert_eq!(bbox[2], u32::MAX as f64);
        assert_eq!(bbox[3], 2.0);
    }
}
