use std::fs;
use std::path::Path;

use serde::Serialize;
use tracing::{debug, info, warn};

use crate::browser::{Browser, with_session};
use crate::catalog::MetadataScraper;
use crate::config::PipelineConfig;
use crate::error::Result;
use crate::extraction::TitleExtractionService;
use crate::models::{
    CandidateEntry, CandidateMap, CandidateOutcome, Catalog, CatalogRun, Detection, OutcomeStatus,
    book_name,
};
use crate::search::SearchClient;
use crate::segmentation::SegmentationService;

/// Runs one shelf photo through segmentation, title extraction, search and
/// scraping.
pub struct BookPipeline {
    segmentation: SegmentationService,
    extraction: TitleExtractionService,
    search: SearchClient,
    scraper: MetadataScraper,
    browser: Box<dyn Browser>,
    config: PipelineConfig,
}

impl BookPipeline {
    /// `browser` opens the sessions used for scraping catalog pages
    pub fn new(
        segmentation: SegmentationService,
        extraction: TitleExtractionService,
        search: SearchClient,
        browser: Box<dyn Browser>,
    ) -> Self {
        let config = PipelineConfig::default();
        Self {
            segmentation,
            extraction,
            search,
            scraper: MetadataScraper::new(config.scrape.clone()),
            browser,
            config,
        }
    }

    pub fn with_config(mut self, config: PipelineConfig) -> Self {
        self.scraper = MetadataScraper::new(config.scrape.clone());
        self.config = config;
        self
    }

    pub fn config(&self) -> &PipelineConfig {
        &self.config
    }

    /// Process one image end to end.
    ///
    /// Segmentation failures and output write failures abort the run; every
    /// per-candidate failure is recorded in [`CatalogRun::outcomes`] instead.
    pub fn run(&self, image_path: &Path) -> Result<CatalogRun> {
        info!(image = %image_path.display(), "starting catalog run");
        let detections = self.segmentation.segment(image_path)?;

        let mut run = CatalogRun {
            detections: detections.len(),
            ..Default::default()
        };

        let (candidates, misses) = self.extract_candidates(&detections)?;
        write_json(&self.config.output.checkpoint_path, &candidates)?;
        info!(
            candidates = candidates.len(),
            misses = misses.len(),
            checkpoint = %self.config.output.checkpoint_path.display(),
            "extraction checkpoint written"
        );
        run.outcomes.extend(misses);

        let mut catalog = Catalog::new();
        let total = candidates.len();
        for (index, (candidate, entry)) in candidates.iter().enumerate() {
            let status = self.resolve_candidate(entry, &mut catalog);
            info!(candidate = %candidate, status = %status, "candidate resolved");
            run.outcomes.push(CandidateOutcome {
                key: candidate.to_string(),
                status,
            });

            if index + 1 < total && !self.config.candidate_delay.is_zero() {
                std::thread::sleep(self.config.candidate_delay);
            }
        }

        write_json(&self.config.output.catalog_path, &catalog)?;
        info!(
            books = catalog.len(),
            catalog = %self.config.output.catalog_path.display(),
            "catalog written"
        );

        run.candidates = candidates;
        run.catalog = catalog;
        Ok(run)
    }

    /// Persist crops and read titles; identical titles overwrite earlier ones
    fn extract_candidates(
        &self,
        detections: &[Detection],
    ) -> Result<(CandidateMap, Vec<CandidateOutcome>)> {
        let crops_dir = self.config.output.segmentations_dir();
        fs::create_dir_all(&crops_dir)?;

        let mut candidates = CandidateMap::new();
        let mut misses = Vec::new();
        for (i, detection) in detections.iter().enumerate() {
            let crop_path = crops_dir.join(detection.crop_file_name());
            detection.crop.save(&crop_path)?;
            debug!(
                detection = %detection.id,
                path = %crop_path.display(),
                "saved crop {} of {}",
                i + 1,
                detections.len()
            );

            let title = match self.extraction.extract(&detection.crop) {
                Ok(Some(title)) => title,
                Ok(None) => {
                    misses.push(CandidateOutcome {
                        key: detection.id.clone(),
                        status: OutcomeStatus::ExtractionMiss { reason: None },
                    });
                    continue;
                }
                Err(err) => {
                    warn!(detection = %detection.id, error = %err, "title extraction failed");
                    misses.push(CandidateOutcome {
                        key: detection.id.clone(),
                        status: OutcomeStatus::ExtractionMiss {
                            reason: Some(err.to_string()),
                        },
                    });
                    continue;
                }
            };

            let entry = CandidateEntry {
                extraction_result: title.clone(),
                crop_path,
                polygon: detection.polygon.clone(),
            };
            if candidates.insert(title.clone(), entry).is_some() {
                debug!(
                    candidate = %title,
                    detection = %detection.id,
                    "duplicate title overwrote earlier detection"
                );
            }
        }

        Ok((candidates, misses))
    }

    fn resolve_candidate(&self, entry: &CandidateEntry, catalog: &mut Catalog) -> OutcomeStatus {
        let name = book_name(&entry.extraction_result);
        let query = format!("{} {}", name, self.config.scrape.site_hint);

        let links = match self.search.search(&query) {
            Ok(links) => links,
            Err(err) => {
                return OutcomeStatus::SearchFailed {
                    reason: err.to_string(),
                };
            }
        };

        let Some(link) = self.scraper.first_catalog_link(&links) else {
            debug!(query = %query, results = links.len(), "no catalog link in results");
            return OutcomeStatus::NoLink;
        };

        let scraped = with_session(self.browser.as_ref(), |session| {
            Ok(self.scraper.scrape(session, link))
        });

        let reason = match scraped {
            Ok(Ok(mut record)) => {
                record.source_link = link.to_string();
                let previous = catalog.insert(name.clone(), record);
                if let Some(previous) = &previous {
                    warn!(
                        book = %name,
                        previous = %previous.source_link,
                        "book name already cataloged, replacing record"
                    );
                }
                return OutcomeStatus::Found {
                    link: link.to_string(),
                    replaced: previous.is_some(),
                };
            }
            Ok(Err(err)) => err.to_string(),
            Err(err) => err.to_string(),
        };
        OutcomeStatus::ScrapeFailed {
            link: link.to_string(),
            reason,
        }
    }
}

fn write_json<T: Serialize>(path: &Path, value: &T) -> Result<()> {
    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        fs::create_dir_all(parent)?;
    }
    let json = serde_json::to_string_pretty(value)?;
    fs::write(path, json)?;
    Ok(())
}
