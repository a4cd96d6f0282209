mod estimator;
